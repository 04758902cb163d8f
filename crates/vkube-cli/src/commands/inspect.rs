use super::{json_pretty, run_session, CommandError, Defaults, Globals, UniverseArgs, EXIT_SUCCESS};
use vkube_core::ResourceReport;

/// Print what a universe snapshot contains. Reverts unless `--save` is given.
pub fn run(globals: &Globals, args: &UniverseArgs) -> Result<u8, CommandError> {
    let json = globals.json;
    let mut report = ResourceReport::default();
    let outcome = run_session(
        globals,
        args,
        Defaults {
            wait: false,
            save: false,
        },
        |universe| {
            report = ResourceReport::collect(universe);
            if !json {
                print!("{}", styled(&report));
            }
            Ok(())
        },
    )?;

    if json {
        let payload = serde_json::json!({
            "resources": report,
            "session": outcome,
        });
        println!("{}", json_pretty(&payload)?);
    }
    Ok(EXIT_SUCCESS)
}

fn styled(report: &ResourceReport) -> String {
    let text = report.to_string();
    match text.split_once('\n') {
        Some((header, rest)) => format!(
            "{}\n{rest}",
            console::Style::new().bold().apply_to(header)
        ),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn styling_keeps_report_lines() {
        let out = styled(&ResourceReport::default());
        assert!(out.contains("Resources available:"));
        assert!(out.ends_with("\n  (none)\n"));
    }
}
