//! Pool backend driving libvirt storage through `virsh`
//!
//! Every operation is a separate `virsh` invocation against the optional
//! connection URI; nothing is cached between calls.

use std::io::{ErrorKind, Read};
use std::process::{Command, Stdio};

use camino::Utf8Path;
use color_eyre::{
    eyre::{eyre, Context},
    Result,
};
use tracing::{debug, instrument};

use super::{PoolBackend, VolumeRef};
use crate::descriptor::VolumeDescriptor;

/// libvirt storage accessed via the `virsh` CLI
#[derive(Debug, Clone, Default)]
pub(crate) struct VirshBackend {
    /// Hypervisor connection URI (e.g., qemu:///system, qemu+ssh://host/system)
    connect: Option<String>,
    /// Program and leading arguments run instead of `virsh`
    #[cfg(test)]
    program: Vec<String>,
}

impl VirshBackend {
    pub fn new(connect: Option<String>) -> Self {
        Self {
            connect,
            ..Default::default()
        }
    }

    #[cfg(test)]
    fn with_program(program: &[&str]) -> Self {
        Self {
            connect: None,
            program: program.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[cfg(not(test))]
    fn base_command(&self) -> Command {
        Command::new("virsh")
    }

    #[cfg(test)]
    fn base_command(&self) -> Command {
        match self.program.split_first() {
            Some((prog, args)) => {
                let mut cmd = Command::new(prog);
                cmd.args(args);
                cmd
            }
            None => Command::new("virsh"),
        }
    }

    /// Build a virsh command with optional connection URI
    fn virsh_command(&self) -> Command {
        let mut cmd = self.base_command();
        if let Some(ref connect) = self.connect {
            cmd.arg("-c").arg(connect);
        }
        cmd
    }

    /// Run virsh to completion and return its stdout
    fn run(&self, args: &[&str]) -> Result<String> {
        debug!("Running virsh {}", args.join(" "));
        let output = self
            .virsh_command()
            .args(args)
            .output()
            .wrap_err("Failed to run virsh")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(eyre!("virsh {} failed: {}", args[0], stderr.trim()));
        }

        Ok(String::from_utf8(output.stdout)?)
    }
}

impl PoolBackend for VirshBackend {
    fn lookup_pool(&self, pool: &str) -> Result<()> {
        self.run(&["pool-info", pool])
            .wrap_err_with(|| format!("Cannot access storage pool '{pool}'"))?;
        Ok(())
    }

    fn lookup_volume(&self, pool: &str, name: &str) -> Result<VolumeRef> {
        self.run(&["vol-info", name, "--pool", pool])?;
        Ok(VolumeRef {
            pool: pool.to_string(),
            name: name.to_string(),
        })
    }

    fn list_volumes(&self, pool: &str) -> Result<Vec<String>> {
        let output = self.run(&["vol-list", pool])?;
        Ok(parse_vol_list(&output))
    }

    fn create_volume(&self, pool: &str, descriptor: &VolumeDescriptor) -> Result<VolumeRef> {
        let xml = descriptor.to_xml();
        debug!("Volume XML for {}: {}", descriptor.name, xml);

        let xmlfile = tempfile::Builder::new()
            .prefix("vmdisk-volume")
            .suffix(".xml")
            .tempfile()?;
        std::fs::write(xmlfile.path(), xml)?;
        let xmlpath = Utf8Path::from_path(xmlfile.path())
            .ok_or_else(|| eyre!("Non-UTF-8 temporary path: {:?}", xmlfile.path()))?;

        self.run(&["vol-create", pool, xmlpath.as_str()])?;
        Ok(VolumeRef {
            pool: pool.to_string(),
            name: descriptor.name.clone(),
        })
    }

    fn delete_volume(&self, vol: &VolumeRef) -> Result<()> {
        self.run(&["vol-delete", &vol.name, "--pool", &vol.pool])?;
        Ok(())
    }

    #[instrument(skip(self, stream))]
    fn upload(
        &self,
        vol: &VolumeRef,
        stream: &mut dyn Read,
        offset: u64,
        length: u64,
    ) -> Result<()> {
        let offset = offset.to_string();
        let length_str = length.to_string();
        // vol-upload wants a file; reading it from our stdin pipe means the
        // source is never staged on disk and an early virsh exit is seen as EPIPE
        let mut uploader = self
            .virsh_command()
            .args([
                "vol-upload",
                "--vol",
                vol.name.as_str(),
                "--file",
                "/dev/stdin",
                "--pool",
                vol.pool.as_str(),
                "--offset",
                offset.as_str(),
                "--length",
                length_str.as_str(),
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .wrap_err("Failed to run virsh vol-upload")?;

        let copied = {
            let Some(mut pipe) = uploader.stdin.take() else {
                let _ = uploader.kill();
                let _ = uploader.wait();
                return Err(eyre!("No stdin pipe for virsh vol-upload"));
            };
            let mut limited = (&mut *stream).take(length);
            std::io::copy(&mut limited, &mut pipe)
        };

        match copied {
            Ok(n) if n == length => debug!("Streamed {n} bytes"),
            Ok(n) => {
                let _ = uploader.kill();
                let _ = uploader.wait();
                return Err(eyre!("Source ended after {n} of {length} bytes"));
            }
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                // virsh went away; its stderr says why
                let output = uploader.wait_with_output()?;
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(eyre!(
                    "virsh vol-upload exited early ({}): {}",
                    output.status,
                    stderr.trim()
                ));
            }
            Err(e) => {
                let _ = uploader.kill();
                let _ = uploader.wait();
                return Err(eyre!(e).wrap_err("Streaming to virsh vol-upload"));
            }
        }

        let output = uploader.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(eyre!("virsh vol-upload failed: {}", stderr.trim()));
        }
        Ok(())
    }

    fn volume_path(&self, vol: &VolumeRef) -> Result<String> {
        let r = self.run(&["vol-path", &vol.name, "--pool", &vol.pool])?;
        Ok(r.trim().to_owned())
    }
}

/// Extract volume names from `virsh vol-list` table output
fn parse_vol_list(output: &str) -> Vec<String> {
    output
        .lines()
        .skip(2) // Skip header lines
        .filter_map(|line| line.split_whitespace().next())
        .filter(|name| !name.starts_with('-'))
        .map(ToOwned::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_parse_vol_list() {
        let output = " Name                 Path
------------------------------------------------------------------------------
 fedora-42.qcow2      /var/lib/libvirt/images/fedora-42.qcow2
 inst1                /var/lib/libvirt/images/inst1

";
        assert_eq!(parse_vol_list(output), vec!["fedora-42.qcow2", "inst1"]);
    }

    #[test]
    fn test_parse_vol_list_empty_pool() {
        let output = " Name   Path
------------------

";
        assert!(parse_vol_list(output).is_empty());
    }

    #[test]
    fn test_virsh_command_connect() {
        let backend = VirshBackend::new(Some("qemu:///system".into()));
        let cmd = backend.virsh_command();
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, ["-c", "qemu:///system"]);

        let cmd = VirshBackend::default().virsh_command();
        assert_eq!(cmd.get_args().count(), 0);
    }

    /// Run an upload on a worker thread so a hang fails the test instead of blocking it
    fn upload_with_deadline(backend: VirshBackend, data: Vec<u8>, length: u64) -> Result<()> {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let vol = VolumeRef {
                pool: "default".into(),
                name: "base1".into(),
            };
            let r = backend.upload(&vol, &mut data.as_slice(), 0, length);
            let _ = tx.send(r);
        });
        rx.recv_timeout(Duration::from_secs(60))
            .expect("upload did not finish")
    }

    #[test]
    fn test_upload_streams_via_stdin() {
        let td = tempfile::tempdir().unwrap();
        let out = td.path().join("uploaded");
        let out = out.to_str().unwrap();
        let backend =
            VirshBackend::with_program(&["sh", "-c", r#"printf '%s\n' "$@" > "$0.args"; cat > "$0""#, out]);

        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 253) as u8).collect();
        upload_with_deadline(backend, data.clone(), data.len() as u64).unwrap();

        assert_eq!(std::fs::read(out).unwrap(), data);
        let args = std::fs::read_to_string(format!("{out}.args")).unwrap();
        let args: Vec<&str> = args.lines().collect();
        assert_eq!(
            args,
            [
                "vol-upload",
                "--vol",
                "base1",
                "--file",
                "/dev/stdin",
                "--pool",
                "default",
                "--offset",
                "0",
                "--length",
                "200000"
            ]
        );
    }

    #[test]
    fn test_upload_virsh_exits_early() {
        let backend = VirshBackend::with_program(&[
            "sh",
            "-c",
            "echo 'error: Storage volume not found' >&2; exit 1",
            "virsh",
        ]);

        // Small enough to fit in the pipe buffer
        let err = upload_with_deadline(backend.clone(), b"abc".to_vec(), 3).unwrap_err();
        assert!(
            err.to_string().contains("Storage volume not found"),
            "{err:#}"
        );

        // Large enough that writing hits the closed pipe
        let data = vec![0u8; 4 << 20];
        let err = upload_with_deadline(backend, data, 4 << 20).unwrap_err();
        assert!(
            err.to_string().contains("Storage volume not found"),
            "{err:#}"
        );
    }

    #[test]
    fn test_upload_short_source() {
        let backend = VirshBackend::with_program(&["sh", "-c", "cat > /dev/null", "virsh"]);
        let err = upload_with_deadline(backend, b"abc".to_vec(), 10).unwrap_err();
        assert!(err.to_string().contains("3 of 10 bytes"), "{err:#}");
    }
}
