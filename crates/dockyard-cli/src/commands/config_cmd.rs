use dockyard_core::{RegistryTarget, ResolvedConfig};

use super::Workspace;

/// Print the resolved deployment config.
///
/// Fails the same way `deploy` would on an unsupported registry or a
/// missing GitHub owner, so it doubles as a pre-flight check.
pub fn config(workspace: &Workspace, json: bool) -> anyhow::Result<()> {
    let config = ResolvedConfig::load(&workspace.config_path, &workspace.env)?;
    let kind = config.registry_kind()?;
    let target = RegistryTarget::from_env(kind, config.registry_host.as_deref(), &workspace.env)?;
    let registry = target.as_registry();

    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    println!("Config: {}", workspace.config_path.display());
    println!("Registry: {} ({kind})", registry.login_server());
    println!("Repositories ({:?}):", config.entry_source);
    for entry in &config.entries {
        let certs = if entry.needs_certificates { "  [certs]" } else { "" };
        println!("  {:<12} {}{certs}", entry.name, entry.source_url);
        println!("  {:<12} -> {}", "", registry.image_path(&entry.name));
    }
    println!("Certificates: {} -> {}", config.cert_dir.display(), config.cert_install_path);
    println!("Dockerfile: {}", config.dockerfile);
    println!("Workspace: {}", config.workspace_dir.display());

    Ok(())
}
