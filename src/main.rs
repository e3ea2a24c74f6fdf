mod cli_runtime;

fn main() {
    if let Err(err) = cli_runtime::run() {
        eprintln!("error: {:#}", err);
        std::process::exit(1);
    }
}
