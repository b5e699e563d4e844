// build.rs

use clap::{Arg, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn packages_arg(help: &'static str) -> Arg {
    Arg::new("packages").num_args(0..).help(help)
}

fn build_cli() -> Command {
    Command::new("kiss")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Source-based package manager")
        .subcommand_required(false)
        .subcommand(
            Command::new("build")
                .visible_alias("b")
                .about("Build packages and their missing dependencies")
                .arg(packages_arg("Packages to build; empty rebuilds every installed package")),
        )
        .subcommand(
            Command::new("checksum")
                .visible_alias("c")
                .about("Generate checksums files from fetched sources")
                .arg(packages_arg("Packages to generate checksums for")),
        )
        .subcommand(
            Command::new("install")
                .visible_alias("i")
                .about("Install built packages")
                .arg(packages_arg("Package names or .tar.gz paths")),
        )
        .subcommand(
            Command::new("list")
                .visible_alias("l")
                .about("List installed packages")
                .arg(packages_arg("Packages to verify; empty lists everything")),
        )
        .subcommand(
            Command::new("remove")
                .visible_alias("r")
                .about("Remove installed packages")
                .arg(packages_arg("Packages to remove")),
        )
        .subcommand(
            Command::new("search")
                .visible_alias("s")
                .about("Search repositories for packages")
                .arg(Arg::new("patterns").num_args(1..).help("Shell-style patterns")),
        )
        .subcommand(
            Command::new("update")
                .visible_alias("u")
                .about("Update outdated installed packages"),
        )
        .subcommand(
            Command::new("version")
                .visible_alias("v")
                .about("Print the manager version"),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    if let Err(e) = fs::write(man_dir.join("kiss.1"), buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
