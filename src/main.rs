use std::process;

fn main() -> miette::Result<()> {
    let code = cbe_diff::cli::run()?;
    process::exit(code)
}
