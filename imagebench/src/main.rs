fn main() {
    if let Err(e) = imagebench::run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
