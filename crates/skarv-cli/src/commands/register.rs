use super::{json_pretty, make_backend, spin_fail, spin_ok, spinner, EXIT_SUCCESS};
use skarv_core::Case;
use std::path::Path;

pub fn run(
    manifest: &Path,
    force: bool,
    remote_url: Option<&str>,
    json: bool,
) -> Result<u8, String> {
    let backend = make_backend(remote_url)?;
    let mut case = Case::open(manifest).map_err(|e| format!("manifest error: {e}"))?;

    let pb = if json {
        None
    } else {
        Some(spinner("registering case..."))
    };

    let existing = if force {
        None
    } else {
        match case.resolve_remote_id(&backend) {
            Ok(id) => id,
            Err(e) => {
                if let Some(ref pb) = pb {
                    spin_fail(pb, "resolve failed");
                }
                return Err(e.to_string());
            }
        }
    };

    let (case_id, created) = match existing {
        Some(id) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, "case already registered");
            }
            (id, false)
        }
        None => match case.register(&backend) {
            Ok(id) => {
                if let Some(ref pb) = pb {
                    spin_ok(pb, "case registered");
                }
                (id, true)
            }
            Err(e) => {
                if let Some(ref pb) = pb {
                    spin_fail(pb, "register failed");
                }
                return Err(e.to_string());
            }
        },
    };

    if json {
        let payload = serde_json::json!({
            "case_id": case_id.as_str(),
            "uuid": case.uuid().as_str(),
            "created": created,
        });
        println!("{}", json_pretty(&payload)?);
    } else if created {
        println!("registered case {} as {case_id}", case.uuid());
    } else {
        println!("case {} already registered as {case_id}", case.uuid());
    }
    Ok(EXIT_SUCCESS)
}
