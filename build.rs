// build script to stamp the build date into the clamfront executable.
// the date is printed by `clamfront --version`

fn main() {
    let date = chrono::Local::now().format("%Y-%m-%d");
    println!("cargo:rustc-env=CLAMFRONT_BUILD_DATE={date}");
    println!("cargo:rerun-if-changed=build.rs");
}
