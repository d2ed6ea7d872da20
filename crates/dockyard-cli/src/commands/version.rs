use dockyard_core::VersionStore;

use super::Workspace;

/// Print the persisted version, creating `version.txt` with 1.0.0 if absent.
pub fn version(workspace: &Workspace) -> anyhow::Result<()> {
    let version = VersionStore::in_dir(&workspace.root).read()?;
    println!("{version}");
    Ok(())
}
