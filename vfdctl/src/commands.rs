use std::io::{SeekFrom, Write};

use anyhow::Context;
use clap::Subcommand;
use libvfd::{EntryKind, FdTable, FileOrDir, OpenFlags};
use tracing::debug;

const READ_CHUNK: usize = 64 * 1024;

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(about = "Print a file")]
    Cat {
        #[arg(value_name = "PATH")]
        path: String,
    },
    #[command(about = "Write DATA into a file, creating it if needed")]
    Write {
        #[arg(value_name = "PATH")]
        path: String,
        #[arg(value_name = "DATA")]
        data: String,
        /// Write at the end of the existing content
        #[arg(long, conflicts_with = "truncate")]
        append: bool,
        /// Discard the existing content first
        #[arg(long)]
        truncate: bool,
    },
    #[command(about = "List a directory")]
    Ls {
        #[arg(value_name = "PATH")]
        path: String,
    },
    #[command(about = "Create a directory")]
    Mkdir {
        #[arg(value_name = "PATH")]
        path: String,
    },
    #[command(about = "Remove a file or directory")]
    Rm {
        #[arg(value_name = "PATH")]
        path: String,
    },
    #[command(about = "Show the registered preopens")]
    Preopens,
}

pub async fn run(table: &mut FdTable, command: &Command, out: &mut impl Write) -> anyhow::Result<()> {
    match command {
        Command::Cat { path } => cat(table, path, out).await,
        Command::Write {
            path,
            data,
            append,
            truncate,
        } => write(table, path, data.as_bytes(), *append, *truncate).await,
        Command::Ls { path } => ls(table, path, out).await,
        Command::Mkdir { path } => {
            let (dir_fd, rel) = table.find_rel_path(path)?;
            let flags = OpenFlags::CREATE | OpenFlags::EXCLUSIVE | OpenFlags::DIRECTORY;
            let fd = table.open(dir_fd, &rel, FileOrDir::DIRECTORY, flags).await?;
            table.close(fd).await?;
            Ok(())
        }
        Command::Rm { path } => {
            let (dir_fd, rel) = table.find_rel_path(path)?;
            table.get_preopen(dir_fd)?.delete(&rel).await?;
            Ok(())
        }
        Command::Preopens => {
            for (fd, path) in table.preopens() {
                writeln!(out, "{fd}\t{path}")?;
            }
            Ok(())
        }
    }
}

async fn cat(table: &mut FdTable, path: &str, out: &mut impl Write) -> anyhow::Result<()> {
    let (dir_fd, rel) = table.find_rel_path(path)?;
    let fd = table
        .open(dir_fd, &rel, FileOrDir::FILE, OpenFlags::empty())
        .await
        .with_context(|| format!("cannot open {path}"))?;
    let file = table.get_mut(fd)?.as_file()?;
    loop {
        let chunk = file.read(READ_CHUNK).await?;
        if chunk.is_empty() {
            break;
        }
        out.write_all(&chunk)?;
    }
    table.close(fd).await?;
    Ok(())
}

async fn write(
    table: &mut FdTable,
    path: &str,
    data: &[u8],
    append: bool,
    truncate: bool,
) -> anyhow::Result<()> {
    let (dir_fd, rel) = table.find_rel_path(path)?;
    let mut flags = OpenFlags::CREATE;
    if truncate {
        flags |= OpenFlags::TRUNCATE;
    }
    let fd = table
        .open(dir_fd, &rel, FileOrDir::FILE, flags)
        .await
        .with_context(|| format!("cannot open {path}"))?;
    let file = table.get_mut(fd)?.as_file()?;
    if append {
        file.seek(SeekFrom::End(0)).await?;
    }
    file.write(data).await?;
    debug!(path, n = data.len(), "written");
    table.close(fd).await?;
    Ok(())
}

async fn ls(table: &mut FdTable, path: &str, out: &mut impl Write) -> anyhow::Result<()> {
    let (dir_fd, rel) = table.find_rel_path(path)?;
    let fd = table
        .open(dir_fd, &rel, FileOrDir::ANY, OpenFlags::DIRECTORY)
        .await
        .with_context(|| format!("cannot open {path}"))?;
    let mut names = Vec::new();
    {
        let dir = table.get_mut(fd)?.as_dir_mut()?;
        let mut entries = dir.get_entries(0).await?;
        while let Some(entry) = entries.next_entry().await? {
            let suffix = if entry.kind() == EntryKind::Directory { "/" } else { "" };
            names.push(format!("{}{suffix}", entry.name()));
        }
    }
    names.sort();
    for name in names {
        writeln!(out, "{name}")?;
    }
    table.close(fd).await?;
    Ok(())
}
