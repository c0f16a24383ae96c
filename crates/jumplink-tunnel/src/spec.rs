//! Declarative description of one SSH tunnel: jump host, auth strategy,
//! and forward/reverse port mapping. [`TunnelSpec::command`] renders
//! this into the literal `ssh` argv.

use std::path::PathBuf;

/// How the tunnel authenticates to the jump host.
#[derive(Debug, Clone)]
pub enum Auth {
    Key { identity_file: PathBuf },
    Password { secret: String },
}

/// Forward (`-L`) tunnels the client to a target reachable from the jump
/// host; reverse (`-R`) tunnels the jump host back to something local.
#[derive(Debug, Clone)]
pub enum TunnelMode {
    Forward {
        local_port: u16,
        target_host: String,
        target_port: u16,
    },
    Reverse {
        target_port: u16,
        local_host: String,
        local_port: u16,
    },
}

#[derive(Debug, Clone)]
pub struct TunnelSpec {
    pub jump_host: String,
    pub jump_user: String,
    pub jump_port: u16,
    pub auth: Auth,
    pub mode: TunnelMode,
}

impl TunnelSpec {
    /// Render the `ssh` argv (program name excluded) for this spec, per
    /// the auth-flag and `-L`/`-R` conventions.
    pub fn command(&self) -> Vec<String> {
        let mut args = Vec::new();

        match &self.auth {
            Auth::Key { identity_file } => {
                args.push("-i".to_string());
                args.push(identity_file.display().to_string());
                args.push("-o".to_string());
                args.push("PreferredAuthentications=publickey".to_string());
            }
            Auth::Password { .. } => {
                args.push("-o".to_string());
                args.push("PreferredAuthentications=password".to_string());
                args.push("-o".to_string());
                args.push("PubkeyAuthentication=no".to_string());
            }
        }

        args.push("-p".to_string());
        args.push(self.jump_port.to_string());

        match &self.mode {
            TunnelMode::Forward {
                local_port,
                target_host,
                target_port,
            } => {
                args.push("-L".to_string());
                args.push(format!("{local_port}:{target_host}:{target_port}"));
            }
            TunnelMode::Reverse {
                target_port,
                local_host,
                local_port,
            } => {
                args.push("-R".to_string());
                args.push(format!("0.0.0.0:{target_port}:{local_host}:{local_port}"));
            }
        }

        args.push("-N".to_string());
        args.push(format!("{}@{}", self.jump_user, self.jump_host));
        args
    }

    pub fn requires_password(&self) -> bool {
        matches!(self.auth, Auth::Password { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_tunnel_renders_the_expected_l_flag() {
        let spec = TunnelSpec {
            jump_host: "jump.example.com".into(),
            jump_user: "alice".into(),
            jump_port: 22,
            auth: Auth::Key {
                identity_file: PathBuf::from("/home/alice/.ssh/id_ed25519"),
            },
            mode: TunnelMode::Forward {
                local_port: 9000,
                target_host: "internal-host".into(),
                target_port: 443,
            },
        };
        let cmd = spec.command();
        assert!(cmd.contains(&"-L".to_string()));
        assert!(cmd.contains(&"9000:internal-host:443".to_string()));
        assert!(cmd.contains(&"alice@jump.example.com".to_string()));
        assert!(cmd.contains(&"PreferredAuthentications=publickey".to_string()));
    }

    #[test]
    fn reverse_tunnel_binds_on_all_interfaces() {
        let spec = TunnelSpec {
            jump_host: "jump.example.com".into(),
            jump_user: "bob".into(),
            jump_port: 2222,
            auth: Auth::Password {
                secret: "hunter2".into(),
            },
            mode: TunnelMode::Reverse {
                target_port: 8080,
                local_host: "localhost".into(),
                local_port: 8080,
            },
        };
        let cmd = spec.command();
        assert!(cmd.contains(&"-R".to_string()));
        assert!(cmd.contains(&"0.0.0.0:8080:localhost:8080".to_string()));
        assert!(cmd.contains(&"PreferredAuthentications=password".to_string()));
        assert!(cmd.contains(&"PubkeyAuthentication=no".to_string()));
    }

    #[test]
    fn password_auth_is_reported_as_requiring_a_password() {
        let spec = TunnelSpec {
            jump_host: "jump".into(),
            jump_user: "u".into(),
            jump_port: 22,
            auth: Auth::Password {
                secret: "s".into(),
            },
            mode: TunnelMode::Forward {
                local_port: 1,
                target_host: "h".into(),
                target_port: 2,
            },
        };
        assert!(spec.requires_password());
    }
}
