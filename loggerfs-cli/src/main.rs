use std::path::PathBuf;
use std::process::ExitCode;

use env_logger::Env;
use fuser::MountOption;
use log::error;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "loggerfs",
    about = "A FUSE filesystem whose files are write-only log sinks backed by PostgreSQL/MySQL."
)]
struct Opt {
    /// Where to mount the filesystem
    mountpoint: PathBuf,
    /// Mount read-only (writes are the whole point, but this is forwarded as-is)
    #[structopt(long)]
    read_only: bool,
    /// Allow other users to access the mount
    #[structopt(long)]
    allow_other: bool,
    /// Allow root to access the mount even when allow_other is not set
    #[structopt(long)]
    allow_root: bool,
    /// Auto-unmount on process exit
    #[structopt(long)]
    auto_unmount: bool,
}

impl Opt {
    fn mount_options(&self) -> Vec<MountOption> {
        let mut options = vec![MountOption::FSName("loggerfs".to_string())];
        if self.read_only {
            options.push(MountOption::RO);
        }
        if self.allow_other {
            options.push(MountOption::AllowOther);
        }
        if self.allow_root {
            options.push(MountOption::AllowRoot);
        }
        if self.auto_unmount {
            options.push(MountOption::AutoUnmount);
        }
        options
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("loggerfs=info")).init();

    let opt = Opt::from_args();
    let options = opt.mount_options();

    if let Err(e) = loggerfs::mount(&opt.mountpoint, &options) {
        error!("loggerfs failed to start: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
