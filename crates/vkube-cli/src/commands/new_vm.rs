use super::{
    json_pretty, ok_line, run_session, CommandError, Defaults, Globals, UniverseArgs, EXIT_SUCCESS,
};
use vkube_universe::{VmSpec, SSH_PORT};

pub fn run(
    globals: &Globals,
    args: &UniverseArgs,
    hostname: &str,
    ports: &[u16],
) -> Result<u8, CommandError> {
    let spec = ports
        .iter()
        .fold(VmSpec::new(hostname), |spec, &port| spec.with_port(port));
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
            let vm = universe.new_vm(&spec)?;
            if !json {
                let ssh = vm
                    .forwarded_port(SSH_PORT)
                    .map_or_else(String::new, |p| format!(": ssh -p{p} root@localhost"));
                println!("{}", ok_line(&format!("created VM {:?}{ssh}", vm.hostname)));
            }
            created = Some(vm);
            Ok(())
        },
    )?;

    if json {
        let payload = serde_json::json!({
            "vm": created,
            "session": outcome,
        });
        println!("{}", json_pretty(&payload)?);
    }
    Ok(EXIT_SUCCESS)
}
