use miette::Result;
use modwire_core::version_string;

pub fn run() -> Result<()> {
    println!("{}", version_string());
    Ok(())
}
