#![forbid(unsafe_code)]

//! Process-level guards for the relay binary.

use anyhow::{Result, bail};
use nix::unistd::Uid;

/// Fails fast when the relay is started as root. The process only ever needs
/// to bind one socket and talk to external HTTP services, so there is no
/// reason to grant it more than a regular user account.
pub fn ensure_not_root() -> Result<()> {
    ensure_unprivileged(Uid::current())
}

fn ensure_unprivileged(uid: Uid) -> Result<()> {
    if uid.is_root() {
        bail!("the relay must not run as root; use a regular user or a dedicated service account");
    }
    Ok(())
}
