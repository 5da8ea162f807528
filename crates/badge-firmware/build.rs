//! Links the esp-hal linker script and exports badge settings from `.env`
//!
//! Recognised variables (all optional):
//! - `BADGE_NAME`: advertised BLE name
//! - `BADGE_BUTTON_STRATEGY`: `edge` or `poll`

const SETTINGS: [&str; 2] = ["BADGE_NAME", "BADGE_BUTTON_STRATEGY"];

fn main() {
    println!("cargo:rustc-link-arg=-Tlinkall.x");

    match dotenvy::dotenv() {
        Ok(path) => println!("cargo:rerun-if-changed={}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => panic!("Failed to read .env: {e}"),
    }

    for key in SETTINGS {
        println!("cargo:rerun-if-env-changed={key}");
        if let Ok(value) = std::env::var(key) {
            println!("cargo:rustc-env={key}={value}");
        }
    }
}
