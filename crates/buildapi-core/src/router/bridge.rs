//! Re-invocation of a call inside the sandbox.
//!
//! The request travels through `<sandbox>/tmp/build-api-XXXX/input.json`, the
//! child writes `output.json` next to it, and the child's exit code is the
//! call's result. Both the rewritten request and the temp directory are
//! scoped guards, so every exit path restores and cleans up.

use std::io;
use std::path::Path;

use chroot_runner::{Invocation, RunError};
use tracing::{debug, info};

use super::Router;
use crate::config::CallConfig;
use crate::error::{Result, RouterError};
use crate::field_handler::SandboxDescriptor;
use crate::message::Message;
use crate::registry::{MethodDescriptor, ServiceDescriptor};

const INPUT_FILE: &str = "input.json";
const OUTPUT_FILE: &str = "output.json";

impl Router {
    pub(super) fn bridge(
        &self,
        service: &ServiceDescriptor,
        method: &MethodDescriptor,
        request: Message,
        sandbox: SandboxDescriptor,
        output_path: &Path,
        config: &CallConfig,
    ) -> Result<i32> {
        let original = request.clone();
        let mut transported = request;
        let schema = transported.schema().clone();
        if let Some(field) = schema.sandbox_field() {
            transported.clear(field);
        }

        let tmp_root = sandbox.tmp_root();
        std::fs::create_dir_all(&tmp_root).map_err(|source| RouterError::SandboxIo {
            path: tmp_root.clone(),
            source,
        })?;

        let paths_in = self
            .translator
            .copy_paths_in(&mut transported, &tmp_root, sandbox.root())?;

        let tmp = tempfile::Builder::new()
            .prefix("build-api-")
            .tempdir_in(&tmp_root)
            .map_err(|source| RouterError::SandboxIo {
                path: tmp_root.clone(),
                source,
            })?;

        let input_host = tmp.path().join(INPUT_FILE);
        let output_host = tmp.path().join(OUTPUT_FILE);
        let input_inside = sandbox.to_sandbox_path(&input_host)?;
        let output_inside = sandbox.to_sandbox_path(&output_host)?;

        let payload = paths_in
            .to_json()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
            .map_err(sandbox_io(&input_host))?;
        self.store
            .write_text(&input_host, &payload)
            .map_err(sandbox_io(&input_host))?;
        self.store
            .touch(&output_host)
            .map_err(sandbox_io(&output_host))?;

        let mut command = vec![
            self.settings.sandbox_entry.clone(),
            format!("{}/{}", service.name(), method.name()),
            "--input-json".to_string(),
            input_inside,
            "--output-json".to_string(),
            output_inside,
        ];
        if let Some(flag) = config.call_type.flag() {
            command.push(flag.to_string());
        }
        let invocation = Invocation::new(command)
            .entering(sandbox.enter_args())
            .with_env(sandbox.env.clone())
            .tolerate_non_zero();

        let code = match self.runner.run(&invocation) {
            Ok(code) => code,
            // A runner that checks anyway still reports a completed run.
            Err(RunError::NonZeroExit { code, .. }) => code,
            Err(source) => return Err(RouterError::SandboxEntryFailed { source }),
        };
        debug!(code, "Sandbox call returned");

        let text = self
            .store
            .read_text(&output_host)
            .map_err(sandbox_io(&output_host))?;
        let response = if text.trim().is_empty() {
            info!("Sandbox call produced no output; responding with the zero value");
            Message::new(method.output().clone())
        } else {
            let mut response = Message::parse_strict(method.output().clone(), &text)
                .map_err(|source| RouterError::InvalidBridgedOutput { source })?;
            self.translator
                .extract_results(&original, &mut response, &sandbox)?;
            response
        };

        drop(tmp);
        drop(paths_in);

        self.write_response(&response, output_path)?;
        Ok(code)
    }
}

fn sandbox_io(path: &Path) -> impl FnOnce(io::Error) -> RouterError {
    let path = path.to_path_buf();
    move |source| RouterError::SandboxIo { path, source }
}
