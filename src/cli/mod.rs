//! CLI command definitions for task-manager
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

use crate::types::NewUser;
use crate::web::forms::{FormErrors, SignupForm};
use clap::{Args, Parser, Subcommand};

/// Task manager web server and admin tools
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Path to database file (overrides config)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the web server (default if no subcommand given)
    Serve(ServeArgs),

    /// Register a user account
    CreateUser(CreateUserArgs),

    /// Send the daily reports that are due right now
    SendReports,
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Port to listen on (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,
}

#[derive(Args, Debug)]
pub struct CreateUserArgs {
    /// Login name
    pub username: String,

    /// Password
    #[arg(long)]
    pub password: String,

    /// Address daily reports are sent to
    #[arg(long, default_value = "")]
    pub email: String,

    #[arg(long, default_value = "")]
    pub first_name: String,

    #[arg(long, default_value = "")]
    pub last_name: String,
}

impl CreateUserArgs {
    /// Apply the signup rules to the command line account.
    pub fn into_new_user(self) -> Result<NewUser, FormErrors> {
        let form = SignupForm {
            username: self.username,
            email: self.email,
            password1: self.password.clone(),
            password2: self.password,
        };
        Ok(NewUser {
            first_name: self.first_name,
            last_name: self.last_name,
            ..form.validate()?
        })
    }
}
