use super::{
    json_pretty, ok_line, run_session, CommandError, Defaults, Globals, UniverseArgs, EXIT_SUCCESS,
};
use vkube_universe::ClusterSpec;

pub fn run(globals: &Globals, args: &UniverseArgs, name: &str, nodes: usize) -> Result<u8, CommandError> {
    let spec = ClusterSpec {
        name: name.to_owned(),
        nodes,
    };
    let json = globals.json;
    let mut created = None;
    let outcome = run_session(
        globals,
        args,
        Defaults {
            wait: false,
            save: true,
        },
        |universe| {
            let cluster = universe.new_cluster(&spec)?;
            if !json {
                println!(
                    "{}",
                    ok_line(&format!(
                        "created cluster {:?} with {nodes} worker(s): export KUBECONFIG={:?}",
                        cluster.name,
                        cluster.kubeconfig.display().to_string()
                    ))
                );
            }
            created = Some(cluster);
            Ok(())
        },
    )?;

    if json {
        let payload = serde_json::json!({
            "cluster": created,
            "session": outcome,
        });
        println!("{}", json_pretty(&payload)?);
    }
    Ok(EXIT_SUCCESS)
}
