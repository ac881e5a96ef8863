//! Build script for the `hostwright` manual pages.
//!
//! Renders `hostwright.1` plus one `hostwright-<verb>.1` page per subcommand
//! into `OUT_DIR`. Release packaging copies them from there into
//! `share/man/man1` next to the installed binary; nothing in the crate reads
//! them at run time.

use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Command, CommandFactory};
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

use cli::Cli;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = std::io::stdout();
    writeln!(stdout, "cargo:rerun-if-changed=build.rs")?;
    writeln!(stdout, "cargo:rerun-if-changed=src/cli/mod.rs")?;

    let out_dir =
        PathBuf::from(env::var_os("OUT_DIR").ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "OUT_DIR was not set")
        })?);

    let command = Cli::command();
    write_page(&out_dir, "hostwright", command.clone())?;
    for verb in command.get_subcommands() {
        let page = format!("hostwright-{}", verb.get_name());
        write_page(&out_dir, &page, verb.clone())?;
    }

    Ok(())
}

fn write_page(out_dir: &Path, page: &str, command: Command) -> std::io::Result<()> {
    let mut buffer = Vec::new();
    Man::new(command).title(page).render(&mut buffer)?;
    fs::write(out_dir.join(format!("{page}.1")), buffer)
}
