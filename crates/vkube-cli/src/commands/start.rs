use super::{json_pretty, run_session, CommandError, Defaults, Globals, UniverseArgs, EXIT_SUCCESS};

/// Bring a universe up and keep it running until interrupted.
pub fn run(globals: &Globals, args: &UniverseArgs) -> Result<u8, CommandError> {
    let defaults = Defaults {
        wait: globals.settings.wait.unwrap_or(true),
        save: false,
    };
    let outcome = run_session(globals, args, defaults, |_| Ok(()))?;
    if globals.json {
        println!("{}", json_pretty(&outcome)?);
    }
    Ok(EXIT_SUCCESS)
}
