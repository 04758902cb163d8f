use super::{json_pretty, CommandError, EXIT_SUCCESS};
use std::path::Path;
use tracing::debug;
use vkube_universe::LocalProvider;

pub fn run(dir: &Path, json: bool) -> Result<u8, CommandError> {
    debug!("listing snapshots of {}", dir.display());
    let names = LocalProvider::snapshots(dir)
        .map_err(|e| CommandError::setup(format!("getting universe: {e}")))?;

    if json {
        let payload = serde_json::json!({
            "universe": dir,
            "snapshots": names,
        });
        println!("{}", json_pretty(&payload)?);
    } else if names.is_empty() {
        println!("no snapshots in {}", dir.display());
    } else {
        println!("snapshots in {}:", dir.display());
        for name in &names {
            println!("  {name}");
        }
    }
    Ok(EXIT_SUCCESS)
}
