//! soli-require CLI: resolve, install and inspect private dependencies.

use std::env;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;

use soli_require::module::installer::{self, InstallCommand};
use soli_require::module::registry::{self, DEFAULT_REGISTRY};
use soli_require::module::{
    Environment, FileSystemLoader, ModuleLoader, Package, Requester, Requirement, ScopedResolver,
};

#[derive(Debug, Parser)]
#[command(name = "soli-require", author, version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Resolve a module name as seen from a directory.
    Resolve {
        /// Dotted module name, e.g. `http.client`.
        name: String,

        /// Directory the request is made from (defaults to the working directory).
        #[arg(long, value_name = "DIR")]
        from: Option<PathBuf>,
    },

    /// Install dependencies into a directory's private dependency folder.
    Install {
        /// Directory receiving the folder.
        #[arg(long, value_name = "DIR", default_value = ".")]
        target: PathBuf,

        /// Folder name (defaults to soli.toml or `.soli_modules`).
        #[arg(long)]
        folder: Option<String>,

        /// Installer program (defaults to soli.toml `[require] installer`).
        #[arg(long)]
        installer: Option<String>,

        /// Requirements or requirement files. Defaults to soli.toml `[dependencies]`.
        deps: Vec<String>,
    },

    /// List units installed in a directory's private dependency folder.
    List {
        #[arg(long, value_name = "DIR", default_value = ".")]
        target: PathBuf,
    },

    /// Pick a registry release for a requirement such as `widget>=1.2`.
    Select {
        requirement: String,

        /// Registry URL (defaults to soli.toml or the public registry).
        #[arg(long, value_name = "URL")]
        registry: Option<String>,
    },
}

fn main() {
    let args = Args::parse();
    let cwd = env::current_dir()
        .unwrap_or_else(|e| fail(format!("Cannot read working directory: {}", e)));
    let package = load_package(&cwd);

    match args.command {
        Command::Resolve { name, from } => run_resolve(&package, &cwd, &name, from),
        Command::Install {
            target,
            folder,
            installer,
            deps,
        } => run_install(&package, &target, folder, installer, deps),
        Command::List { target } => run_list(&package, &target),
        Command::Select {
            requirement,
            registry,
        } => run_select(&package, &requirement, registry),
    }
}

fn load_package(cwd: &Path) -> Package {
    match Package::find(cwd) {
        Some(path) => Package::load(&path)
            .unwrap_or_else(|e| fail(format!("Failed to read {}: {}", path.display(), e))),
        None => Package::default(),
    }
}

fn run_resolve(package: &Package, cwd: &Path, name: &str, from: Option<PathBuf>) {
    let env = Arc::new(Environment::from_env(cwd));
    let config = package.resolver_config().with_env_overrides();
    let delegate: Arc<dyn ModuleLoader> =
        Arc::new(FileSystemLoader::with_layout(env.clone(), package.unit_layout()));
    let resolver = ScopedResolver::new(delegate, env, config);

    let from = from.unwrap_or_else(|| cwd.to_path_buf());
    let requester = Requester::directory(&from);
    let scope = soli_require::module::PathResolver::new(None)
        .caller_directory(&requester)
        .ok()
        .and_then(|dir| resolver.find_scope(&dir));

    match resolver.resolve_from(name, &requester) {
        Ok(module) => {
            let local = scope.map(|s| s.satisfied(&module)).unwrap_or(false);
            let label = if local { "local".green() } else { "global".yellow() };
            println!("{} {} ({})", module.name().bold(), module.origin().display(), label);
        }
        Err(e) => fail(e.to_string()),
    }
}

fn run_install(
    package: &Package,
    target: &Path,
    folder: Option<String>,
    installer: Option<String>,
    deps: Vec<String>,
) {
    let folder = folder.unwrap_or_else(|| package.resolver_config().scope_folder);
    let installer = installer
        .or_else(|| package.require.installer.clone())
        .unwrap_or_default();
    let deps = if deps.is_empty() {
        package.install_specs()
    } else {
        deps
    };

    let result = InstallCommand::build(&installer, target, &folder, &deps).and_then(|command| {
        let scope_dir = installer::make_scope_dir(target, &folder)?;
        println!("{} {}", "Installing into".green(), scope_dir.display());
        command.run()
    });
    if let Err(e) = result {
        fail(e.to_string());
    }
    println!("{}", "Done".green().bold());
}

fn run_list(package: &Package, target: &Path) {
    let scope_dir = target.join(package.resolver_config().scope_folder);
    if !scope_dir.is_dir() {
        println!("No private dependency folder at {}", scope_dir.display());
        return;
    }
    match installer::installed_units(&scope_dir, &package.unit_layout()) {
        Ok(units) if units.is_empty() => println!("{} is empty", scope_dir.display()),
        Ok(units) => {
            for unit in units {
                println!("  {}", unit);
            }
        }
        Err(e) => fail(e.to_string()),
    }
}

fn run_select(package: &Package, requirement: &str, registry_url: Option<String>) {
    let requirement: Requirement = requirement
        .parse()
        .unwrap_or_else(|e: soli_require::error::RequirementError| fail(e.to_string()));
    let registry_url = registry_url
        .or_else(|| package.require.registry.clone())
        .unwrap_or_else(|| DEFAULT_REGISTRY.to_string());

    let version = match registry::select(&registry_url, &requirement) {
        Ok(Some(version)) => version,
        Ok(None) => fail(format!(
            "No release of '{}' satisfies '{}'",
            requirement.name, requirement
        )),
        Err(e) => fail(e),
    };
    println!("{} {}", requirement.name.bold(), version.green());

    match registry::resolve_version(&registry_url, &requirement.name, &version) {
        Ok(info) => println!("  {}", info.download_url),
        Err(e) => eprintln!("{} {}", "Warning:".yellow(), e),
    }
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("{} {}", "Error:".red().bold(), message);
    process::exit(1);
}
