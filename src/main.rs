fn main() {
    if let Err(err) = gaod::cli::main() {
        eprintln!("❌ {err}");
        std::process::exit(1);
    }
}
