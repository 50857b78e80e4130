//! rmap - command-line interface for the resource mount-tree resolution core.

use clap::{Parser, Subcommand};
use colored::Colorize;
use rmap_core::memory::MemoryBackend;
use rmap_core::{
    Config, MapEntries, ProviderFlags, ProviderMode, ProviderRegistry, Resource, ResourceMapper,
    ResourceResolverControl,
};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Parser)]
#[command(name = "rmap")]
#[command(about = "Inspect resource mount-tree resolution and mapping", long_about = None)]
struct Cli {
    /// JSON file of resources to seed a local in-memory mount (ignored in service mode)
    #[arg(long, global = true)]
    seed: Option<PathBuf>,

    /// Resolver config (TOML); defaults built in if omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Resolve against a remote rmap-service instead of an in-process mount
    #[arg(long, global = true, env = "RMAP_SERVICE_URL")]
    service_url: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a request path to a resource or redirect
    Resolve {
        path: String,
        /// scheme://host:port used to pick among redirect targets
        #[arg(long)]
        authority: Option<String>,
    },

    /// Compute the externally-visible URL(s) for an internal resource path
    Map {
        resource_path: String,
        #[arg(long)]
        context_path: Option<String>,
        /// Show every candidate instead of only the first
        #[arg(long)]
        all: bool,
    },

    /// Inspect the alias index (local mount only)
    Alias {
        parent: String,
        /// Show aliases for one child instead of every child under parent
        #[arg(long)]
        child: Option<String>,
    },

    /// Look up a vanity path (local mount only)
    Vanity { path: String },

    /// Re-scan the mount and rebuild the alias/vanity/resolve-map indices
    Refresh {
        #[arg(long)]
        background: bool,
    },

    /// Show resolver lifecycle state and mount/index counters
    Status,

    /// Launch rmap-service as a child process
    Serve {
        #[arg(long, default_value_t = 3000)]
        port: u16,
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] rmap_core::MapError),
    #[cfg(feature = "service")]
    #[error(transparent)]
    Client(#[from] rmap_client::ClientError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("{0} requires a local mount; pass no --service-url")]
    LocalOnly(&'static str),
    #[error("rebuild with --features service to use --service-url")]
    FeatureDisabled,
}

fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    let result = match cli.command {
        Commands::Resolve { path, authority } => cmd_resolve(
            cli.seed,
            cli.config,
            cli.service_url,
            &path,
            authority.as_deref(),
            json,
        ),
        Commands::Map {
            resource_path,
            context_path,
            all,
        } => cmd_map(
            cli.seed,
            cli.config,
            cli.service_url,
            &resource_path,
            context_path.as_deref(),
            all,
            json,
        ),
        Commands::Alias { parent, child } => {
            cmd_alias(cli.seed, cli.config, cli.service_url, &parent, child.as_deref(), json)
        }
        Commands::Vanity { path } => cmd_vanity(cli.seed, cli.config, cli.service_url, &path, json),
        Commands::Refresh { background } => {
            cmd_refresh(cli.seed, cli.config, cli.service_url, background, json)
        }
        Commands::Status => cmd_status(cli.seed, cli.config, cli.service_url, json),
        Commands::Serve { port, bind } => cmd_serve(port, &bind),
    };

    if let Err(e) = result {
        if json {
            println!("{}", serde_json::to_string_pretty(&error_envelope(&e)).unwrap());
        } else {
            eprintln!("Error: {e}");
        }
        std::process::exit(1);
    }
}

fn error_envelope(err: &CliError) -> serde_json::Value {
    match err {
        CliError::Core(e) => {
            let env = e.envelope();
            serde_json::json!({ "code": env.code, "message": env.message, "hint": env.hint })
        }
        #[cfg(feature = "service")]
        CliError::Client(rmap_client::ClientError::Service { code, message, hint }) => {
            serde_json::json!({ "code": code, "message": message, "hint": hint })
        }
        _ => serde_json::json!({ "code": "error", "message": err.to_string(), "hint": "" }),
    }
}

// ---------------------------------------------------------------------------
// Local in-process mount
// ---------------------------------------------------------------------------

/// A single provider mounted at `/`, backed by `MemoryBackend` and seeded
/// from a JSON resource dump. Concrete storage adapters are out of scope
/// for the core library, so this is the CLI's only local-mode backing store.
struct LocalMount {
    map_entries: Arc<MapEntries>,
    registry: ProviderRegistry,
    mapper: ResourceMapper,
}

impl LocalMount {
    fn open(config: Config, seed: Option<PathBuf>) -> Result<Self, CliError> {
        let resources = match seed {
            Some(path) => {
                let content = std::fs::read_to_string(&path)?;
                serde_json::from_str::<Vec<Resource>>(&content)?
            }
            None => Vec::new(),
        };

        let map_entries = MapEntries::new(config);
        let mapper = ResourceMapper::new(Arc::clone(&map_entries));
        let mut registry = ProviderRegistry::new();
        registry.register(
            "/",
            ProviderMode::Overlay,
            ProviderFlags {
                modifiable: true,
                adaptable: true,
                refreshable: true,
                attributable: true,
                queryable: true,
            },
            0,
            Arc::new(MemoryBackend::with_resources(resources.clone())),
        );
        map_entries.initialize(&resources, Vec::new());

        Ok(Self { map_entries, registry, mapper })
    }

    fn resolver(&self) -> ResourceResolverControl {
        ResourceResolverControl::open(self.registry.snapshot(), Arc::clone(&self.map_entries))
    }

    /// Re-list the mounted backend's children and rebuild the indices,
    /// mirroring what the service does on `POST /refresh`.
    fn refresh(&self, background: bool) -> Result<(), CliError> {
        let snapshot = self.registry.snapshot();
        let mut resources = Vec::new();
        if let Some(handle) = snapshot.handles.first() {
            resources.extend(handle.backend.list_children("/")?);
        }
        if background {
            self.map_entries.initialize_in_background(resources, Vec::new());
        } else {
            self.map_entries.initialize(&resources, Vec::new());
        }
        Ok(())
    }
}

fn load_config(path: Option<PathBuf>) -> Result<Config, CliError> {
    match path {
        Some(p) => Ok(Config::load(&p)?),
        None => Ok(Config::default()),
    }
}

// ---------------------------------------------------------------------------
// resolve
// ---------------------------------------------------------------------------

enum ResolveOutcome {
    Resource(Resource),
    Redirect { status: i32, location: String },
    NotFound,
}

#[cfg(feature = "service")]
impl From<rmap_client::ResolveResponse> for ResolveOutcome {
    fn from(r: rmap_client::ResolveResponse) -> Self {
        match r {
            rmap_client::ResolveResponse::Resource { resource } => ResolveOutcome::Resource(resource),
            rmap_client::ResolveResponse::Redirect { status, location } => {
                ResolveOutcome::Redirect { status, location }
            }
            rmap_client::ResolveResponse::NotFound => ResolveOutcome::NotFound,
        }
    }
}

fn resolve_locally(mount: &LocalMount, path: &str, authority: Option<&str>) -> Result<ResolveOutcome, CliError> {
    let entries = mount.map_entries.resolve_entries(path);
    let mut effective_path = path.to_string();

    if let Some(entry) = entries.first() {
        let target = entry.best_redirect(authority).unwrap_or(path).to_string();
        if !entry.is_internal() {
            return Ok(ResolveOutcome::Redirect { status: entry.status, location: target });
        }
        effective_path = target;
    }

    let control = mount.resolver();
    Ok(match control.get(&effective_path, true)? {
        Some(resource) => ResolveOutcome::Resource(resource),
        None => ResolveOutcome::NotFound,
    })
}

fn cmd_resolve(
    seed: Option<PathBuf>,
    config: Option<PathBuf>,
    service_url: Option<String>,
    path: &str,
    authority: Option<&str>,
    json: bool,
) -> Result<(), CliError> {
    let outcome = if let Some(url) = service_url {
        #[cfg(feature = "service")]
        {
            let client = rmap_client::ServiceClient::new(&url);
            ResolveOutcome::from(client.resolve(path, authority)?)
        }
        #[cfg(not(feature = "service"))]
        {
            let _ = (url, authority);
            return Err(CliError::FeatureDisabled);
        }
    } else {
        let mount = LocalMount::open(load_config(config)?, seed)?;
        resolve_locally(&mount, path, authority)?
    };

    if json {
        let value = match &outcome {
            ResolveOutcome::Resource(r) => serde_json::json!({"kind": "resource", "resource": r}),
            ResolveOutcome::Redirect { status, location } => {
                serde_json::json!({"kind": "redirect", "status": status, "location": location})
            }
            ResolveOutcome::NotFound => serde_json::json!({"kind": "not_found"}),
        };
        println!("{}", serde_json::to_string_pretty(&value).unwrap());
    } else {
        match &outcome {
            ResolveOutcome::Resource(r) => {
                println!(
                    "{}: {} [{}]{}",
                    "resource".green(),
                    r.path,
                    r.resource_type,
                    if r.synthetic { " (synthetic)".dimmed().to_string() } else { String::new() }
                );
                if !r.children.is_empty() {
                    println!("{}: {}", "children".blue(), r.children.join(", "));
                }
            }
            ResolveOutcome::Redirect { status, location } => {
                println!("{}: {} -> {}", "redirect".yellow(), status, location);
            }
            ResolveOutcome::NotFound => println!("{}", "not found".red()),
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// map
// ---------------------------------------------------------------------------

fn cmd_map(
    seed: Option<PathBuf>,
    config: Option<PathBuf>,
    service_url: Option<String>,
    resource_path: &str,
    context_path: Option<&str>,
    all: bool,
    json: bool,
) -> Result<(), CliError> {
    let mappings = if let Some(url) = service_url {
        #[cfg(feature = "service")]
        {
            let client = rmap_client::ServiceClient::new(&url);
            client.map(resource_path, context_path, all)?.mappings
        }
        #[cfg(not(feature = "service"))]
        {
            let _ = (url, context_path, all);
            return Err(CliError::FeatureDisabled);
        }
    } else {
        let mount = LocalMount::open(load_config(config)?, seed)?;
        if all {
            mount.mapper.get_all_mappings(resource_path, context_path)
        } else {
            vec![mount.mapper.get_mapping(resource_path, context_path)]
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "mappings": mappings })).unwrap());
    } else {
        for m in &mappings {
            println!("{}", m.cyan());
        }
        println!("({} mapping{})", mappings.len(), if mappings.len() == 1 { "" } else { "s" });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// alias / vanity (local mount only)
// ---------------------------------------------------------------------------

fn cmd_alias(
    seed: Option<PathBuf>,
    config: Option<PathBuf>,
    service_url: Option<String>,
    parent: &str,
    child: Option<&str>,
    json: bool,
) -> Result<(), CliError> {
    if service_url.is_some() {
        return Err(CliError::LocalOnly("alias"));
    }
    let mount = LocalMount::open(load_config(config)?, seed)?;
    let index = mount.map_entries.alias_index();

    if let Some(child_name) = child {
        let aliases = index.aliases_for(parent, child_name);
        if json {
            println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "aliases": aliases })).unwrap());
        } else if aliases.is_empty() {
            println!("{}", "no aliases".dimmed());
        } else {
            println!("{}", aliases.join(", "));
        }
    } else {
        let children = index.children_of(parent);
        if json {
            println!("{}", serde_json::to_string_pretty(&children).unwrap());
        } else if children.is_empty() {
            println!("{}", "no aliased children".dimmed());
        } else {
            for (name, aliases) in &children {
                println!("{}: {}", name.cyan(), aliases.join(", "));
            }
        }
    }
    Ok(())
}

fn cmd_vanity(
    seed: Option<PathBuf>,
    config: Option<PathBuf>,
    service_url: Option<String>,
    path: &str,
    json: bool,
) -> Result<(), CliError> {
    if service_url.is_some() {
        return Err(CliError::LocalOnly("vanity"));
    }
    let mount = LocalMount::open(load_config(config)?, seed)?;
    let hits = mount.map_entries.vanity_index().lookup(path);

    if json {
        let value: Vec<_> = hits
            .iter()
            .map(|e| serde_json::json!({"redirects": e.redirects, "status": e.status}))
            .collect();
        println!("{}", serde_json::to_string_pretty(&value).unwrap());
    } else if hits.is_empty() {
        println!("{}", "no vanity entry".dimmed());
    } else {
        for entry in &hits {
            println!("{}: {} (status {})", "redirect".yellow(), entry.redirects.join(", "), entry.status);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// refresh / status
// ---------------------------------------------------------------------------

fn cmd_refresh(
    seed: Option<PathBuf>,
    config: Option<PathBuf>,
    service_url: Option<String>,
    background: bool,
    json: bool,
) -> Result<(), CliError> {
    let (state, change_generation) = if let Some(url) = service_url {
        #[cfg(feature = "service")]
        {
            let client = rmap_client::ServiceClient::new(&url);
            let resp = client.refresh(background)?;
            (resp.state, resp.change_generation)
        }
        #[cfg(not(feature = "service"))]
        {
            let _ = (url, background);
            return Err(CliError::FeatureDisabled);
        }
    } else {
        let mount = LocalMount::open(load_config(config)?, seed)?;
        mount.refresh(background)?;
        (format!("{:?}", mount.map_entries.state()), mount.map_entries.change_generation())
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({"state": state, "change_generation": change_generation}))
                .unwrap()
        );
    } else {
        println!("{}: {}", "state".blue(), state);
        println!("{}: {}", "change generation".blue(), change_generation);
    }
    Ok(())
}

fn cmd_status(
    seed: Option<PathBuf>,
    config: Option<PathBuf>,
    service_url: Option<String>,
    json: bool,
) -> Result<(), CliError> {
    if let Some(url) = service_url {
        #[cfg(feature = "service")]
        {
            let client = rmap_client::ServiceClient::new(&url);
            let status = client.status()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status).unwrap());
            } else {
                println!("{}: {}", "service".green(), status.service);
                println!("{}: {}", "state".blue(), status.state);
                println!("{}: {}", "mounted providers".blue(), status.mounted_providers);
                println!("{}: {}", "unclosed resolvers".blue(), status.unclosed_resolvers);
            }
            return Ok(());
        }
        #[cfg(not(feature = "service"))]
        {
            let _ = url;
            return Err(CliError::FeatureDisabled);
        }
    }

    let mount = LocalMount::open(load_config(config)?, seed)?;
    let lifecycle = format!("{:?}", mount.map_entries.state());
    let alias_children = mount.map_entries.alias_index().children_with_aliases_count();
    let vanity_entries = mount.map_entries.vanity_index().len();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "state": lifecycle,
                "change_generation": mount.map_entries.change_generation(),
                "alias_children": alias_children,
                "vanity_entries": vanity_entries,
                "unclosed_resolvers": mount.map_entries.unclosed_resolvers(),
            }))
            .unwrap()
        );
    } else {
        println!("{}: {}", "state".blue(), lifecycle);
        println!("{}: {}", "change generation".blue(), mount.map_entries.change_generation());
        println!("{}: {}", "aliased children".blue(), alias_children);
        println!("{}: {}", "vanity entries".blue(), vanity_entries);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// serve
// ---------------------------------------------------------------------------

fn cmd_serve(port: u16, bind: &str) -> Result<(), CliError> {
    println!("{} rmap-service on {}:{}", "Starting".green(), bind, port);
    let status = std::process::Command::new("rmap-service")
        .arg("--port")
        .arg(port.to_string())
        .arg("--bind")
        .arg(bind)
        .status()?;
    if !status.success() {
        std::process::exit(status.code().unwrap_or(1));
    }
    Ok(())
}
