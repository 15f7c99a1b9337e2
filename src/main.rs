use std::path::PathBuf;

#[derive(Debug, Default)]
struct CliArgs {
    dir: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = parse_args(std::env::args().skip(1).collect())?;
    let root = match args.dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    termdeck::app::run(termdeck::config::normalize_path(&root))
}

fn parse_args(args: Vec<String>) -> anyhow::Result<CliArgs> {
    let mut out = CliArgs::default();
    for arg in args {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            flag if flag.starts_with('-') => anyhow::bail!("unknown argument {flag}"),
            path => {
                if out.dir.is_some() {
                    anyhow::bail!("only one directory can be given");
                }
                out.dir = Some(PathBuf::from(path));
            }
        }
    }
    Ok(out)
}

fn print_help() {
    println!("termdeck [DIRECTORY]");
    println!("  Browse DIRECTORY (default: current directory) and queue tracks for playback.");
    println!("  -h, --help        Show this help");
    println!();
    println!("Press ? inside the player for the list of controls.");
}
