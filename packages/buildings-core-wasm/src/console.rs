// Logging bridge: the browser console on wasm, `tracing` everywhere else.

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::JsValue;

#[cfg(target_arch = "wasm32")]
pub fn log(s: &str) {
    web_sys::console::log_1(&JsValue::from_str(s));
}

#[cfg(target_arch = "wasm32")]
pub fn warn(s: &str) {
    web_sys::console::warn_1(&JsValue::from_str(s));
}

#[cfg(target_arch = "wasm32")]
pub fn debug(s: &str) {
    web_sys::console::debug_1(&JsValue::from_str(s));
}

#[cfg(not(target_arch = "wasm32"))]
pub fn log(s: &str) {
    tracing::info!(target: "buildings", "{}", s);
}

#[cfg(not(target_arch = "wasm32"))]
pub fn warn(s: &str) {
    tracing::warn!(target: "buildings", "{}", s);
}

#[cfg(not(target_arch = "wasm32"))]
pub fn debug(s: &str) {
    tracing::debug!(target: "buildings", "{}", s);
}

/// Milliseconds from an arbitrary origin, for stage timings only.
#[cfg(target_arch = "wasm32")]
pub fn now_ms() -> f64 {
    js_sys::Date::now()
}

#[cfg(not(target_arch = "wasm32"))]
pub fn now_ms() -> f64 {
    use std::sync::OnceLock;
    use std::time::Instant;

    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    ORIGIN.get_or_init(Instant::now).elapsed().as_secs_f64() * 1000.0
}

// Note: the console_log / console_warn / console_debug macros are defined in lib.rs
