use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use enquete_core::Enquete;
use enquete_core::models::{AuthMode, Credentials};

use crate::cli::{AuthCommand, Commands};

mod run;

pub(crate) fn run_from_root(root: &Path, command: Commands) -> Result<()> {
    let app = Enquete::new(root).context("failed to open the survey workspace")?;

    match command {
        Commands::Run => run::run_survey(&app),
        Commands::Status => print_json(&app.resume_state()?),
        Commands::Result(args) => {
            let session_id = match args.session {
                Some(id) => id,
                None => app
                    .resume_state()?
                    .cache
                    .map(|entry| entry.session_id)
                    .context("no --session given and no survey in progress")?,
            };
            print_json(&app.results(&session_id)?)
        }
        Commands::Finalize => match app.finalize_pending()? {
            Some(receipt) => print_json(&receipt),
            None => {
                println!("no pending session to finalize");
                Ok(())
            }
        },
        Commands::Reset => {
            if app.reset()? {
                println!("local progress cleared");
            } else {
                println!("no survey in progress");
            }
            Ok(())
        }
        Commands::Auth(args) => handle_auth(&app, args.command),
    }
}

fn handle_auth(app: &Enquete, command: AuthCommand) -> Result<()> {
    match command {
        AuthCommand::Signup {
            email,
            password,
            full_name,
        } => {
            let identity = app.authenticate(&Credentials {
                mode: AuthMode::SignUp,
                email,
                password,
                full_name,
            })?;
            print_json(&identity)
        }
        AuthCommand::Signin { email, password } => {
            let identity = app.authenticate(&Credentials {
                mode: AuthMode::SignIn,
                email,
                password,
                full_name: None,
            })?;
            print_json(&identity)
        }
        AuthCommand::Signout => {
            if app.sign_out()? {
                println!("signed out");
            } else {
                println!("nobody was signed in");
            }
            Ok(())
        }
        AuthCommand::Whoami => match app.current_identity()? {
            Some(identity) => print_json(&identity),
            None => {
                println!("not signed in");
                Ok(())
            }
        },
    }
}

pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}
