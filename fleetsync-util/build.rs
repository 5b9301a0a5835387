//! Compile time configurations for the util crate
fn main() {
    // the FLEETSYNC_PKG_NAME variable is used to create local folders under
    // `~/.config` and other directories. Changing it means previously stored
    // configuration will no longer be found.
    println!("cargo::rustc-env=FLEETSYNC_PKG_NAME=fleetsync");
}
