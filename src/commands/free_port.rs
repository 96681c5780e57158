use anyhow::Result;

use nodewarden::PortAllocator;

/// Print a local port that is free right now.
pub fn execute() -> Result<()> {
    let port = PortAllocator::new().allocate()?;
    println!("{port}");
    Ok(())
}
