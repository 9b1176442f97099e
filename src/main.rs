fn main() {
    if let Err(e) = liquid_otc_lib::run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
