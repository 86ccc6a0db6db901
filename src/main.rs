fn main() {
    if let Err(err) = incident_insights::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
