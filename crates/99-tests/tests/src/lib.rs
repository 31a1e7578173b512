//! Cross-crate scenario tests for the connection layer.

#[cfg(all(test, not(target_arch = "wasm32")))]
mod recording;

#[cfg(all(test, not(target_arch = "wasm32")))]
mod lifecycle;

#[cfg(all(test, not(target_arch = "wasm32")))]
mod scenarios;
