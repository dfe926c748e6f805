fn main() {
    // ESP-IDF build environment propagation. Host-target builds (tests,
    // simulation) compile without the espidf feature and skip this.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
