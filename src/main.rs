fn main() {
    if let Err(err) = mcplink::cli::main() {
        eprintln!("❌ {err}");
        std::process::exit(1);
    }
}
