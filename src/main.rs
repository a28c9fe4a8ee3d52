use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use git_line_stager::{Direction, GitStager, GitStagerError, Scope, view};
use std::io::{self, BufRead, Write};

#[derive(Parser)]
#[command(name = "git-line-stager")]
#[command(about = "Stage or unstage a single line or hunk of a file's changes")]
struct Cli {
    /// Run as if git was started in this directory
    #[arg(short = 'C', long = "repo", default_value = ".", global = true)]
    repo: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Selection {
    /// File with unstaged changes
    file: String,
    /// Position among the file's stageable lines (as listed by `show`)
    #[arg(short, long, default_value_t = 0)]
    select: usize,
    /// Act on the whole hunk containing the selected line
    #[arg(long)]
    hunk: bool,
}

impl Selection {
    fn scope(&self) -> Scope {
        if self.hunk { Scope::Hunk } else { Scope::Line }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show the hunk around a stageable line
    Show {
        /// File with unstaged changes
        file: String,
        /// Position among the file's stageable lines
        #[arg(short, long, default_value_t = 0)]
        select: usize,
        /// Viewport height in lines
        #[arg(long, default_value_t = 20)]
        height: usize,
    },
    /// Stage the selected line (or its hunk) into the index
    Stage(Selection),
    /// Take the selected line (or its hunk) out of the working tree changes
    Unstage(Selection),
    /// Drive the staging panel with one-letter commands read from stdin
    Interactive {
        /// File with unstaged changes
        file: String,
        /// Viewport height in lines
        #[arg(long, default_value_t = 20)]
        height: usize,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
    /// Generate a man page
    Man,
}

const INTERACTIVE_HELP: &str = "j/k: next/previous line  J/K: next/previous hunk  s/S: stage line/hunk  u/U: unstage line/hunk  q: quit";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Show {
            file,
            select,
            height,
        } => {
            let mut stager = GitStager::open(&cli.repo, file)?;
            stager.select(select)?;
            print_focus(&stager, height);
        }
        Commands::Stage(selection) => {
            let mut stager = GitStager::open(&cli.repo, selection.file.as_str())?;
            stager.select(selection.select)?;
            stager.stage(selection.scope())?;
        }
        Commands::Unstage(selection) => {
            let mut stager = GitStager::open(&cli.repo, selection.file.as_str())?;
            stager.select(selection.select)?;
            stager.unstage(selection.scope()).inspect_err(report_fatal)?;
        }
        Commands::Interactive { file, height } => {
            let mut stager = GitStager::open(&cli.repo, file)?;
            interactive(&mut stager, height)?;
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "git-line-stager", &mut io::stdout());
        }
        Commands::Man => {
            clap_mangen::Man::new(Cli::command()).render(&mut io::stdout())?;
        }
    }

    Ok(())
}

fn report_fatal(error: &GitStagerError) {
    if matches!(error, GitStagerError::RollbackFailed { .. }) {
        eprintln!("FATAL: the working tree may be in an inconsistent state.");
        eprintln!("Inspect it with `git diff` before doing anything else.");
    }
}

fn print_focus(stager: &GitStager<'_>, height: usize) {
    if let Some(session) = stager.session() {
        let region = session.focus_region(height);
        println!("{}", view::render_region(session.diff(), &region));
        println!(
            "[{}/{}] {}",
            session.selected() + 1,
            session.stageable_lines().len(),
            stager.file()
        );
    }
}

/// One command of the `interactive` loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Key {
    Quit,
    Line(Direction),
    Hunk(Direction),
    Stage(Scope),
    Unstage(Scope),
    Redraw,
}

impl Key {
    fn parse(input: &str) -> Option<Self> {
        let key = match input.trim() {
            "q" => Key::Quit,
            "j" => Key::Line(Direction::Forward),
            "k" => Key::Line(Direction::Backward),
            "J" => Key::Hunk(Direction::Forward),
            "K" => Key::Hunk(Direction::Backward),
            "s" => Key::Stage(Scope::Line),
            "S" => Key::Stage(Scope::Hunk),
            "u" => Key::Unstage(Scope::Line),
            "U" => Key::Unstage(Scope::Hunk),
            "" => Key::Redraw,
            _ => return None,
        };
        Some(key)
    }
}

fn interactive(
    stager: &mut GitStager<'_>,
    height: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("{INTERACTIVE_HELP}");
    print_focus(stager, height);

    for line in io::stdin().lock().lines() {
        let line = line?;
        let Some(key) = Key::parse(&line) else {
            eprintln!("Unknown command '{}'. {INTERACTIVE_HELP}", line.trim());
            continue;
        };

        let result = match key {
            Key::Quit => break,
            Key::Line(direction) => {
                if let Some(session) = stager.session_mut() {
                    session.cycle_line(direction);
                }
                Ok(())
            }
            Key::Hunk(direction) => {
                if let Some(session) = stager.session_mut() {
                    session.cycle_hunk(direction);
                }
                Ok(())
            }
            Key::Stage(scope) => stager.stage(scope),
            Key::Unstage(scope) => stager.unstage(scope),
            Key::Redraw => Ok(()),
        };

        match result {
            Err(error @ GitStagerError::RollbackFailed { .. }) => {
                report_fatal(&error);
                return Err(error.into());
            }
            Err(error) => eprintln!("{error}"),
            Ok(()) => {}
        }

        if !stager.panel().is_active() {
            println!("Staging panel for {} closed", stager.file());
            break;
        }
        print_focus(stager, height);
        io::stdout().flush()?;
    }

    Ok(())
}
