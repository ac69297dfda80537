fn main() {
    // ESP-IDF environment is only needed for the firmware target.
    if std::env::var_os("CARGO_FEATURE_ESP32").is_some() {
        embuild::espidf::sysenv::output();
    }
}
