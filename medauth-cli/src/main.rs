mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cli::handlers;

#[derive(Parser)]
#[command(name = "medauth")]
#[command(version = "0.1.0")]
#[command(about = "Patient-approved access to medical documents over SMS and WhatsApp")]
#[command(
    help_template = "{name} - {version}\n{about}\n\n{usage-heading}\n  {usage}\n\n{all-args}{options}\n"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the medauth server
    ///
    /// Settings come from the configuration file; --host and --port override it.
    /// Twilio and Pinata credentials are read from the environment:
    ///   MEDAUTH_TWILIO_AUTH_TOKEN, MEDAUTH_PINATA_API_KEY, MEDAUTH_PINATA_API_SECRET
    Serve {
        /// Server bind address
        #[arg(long)]
        host: Option<String>,

        /// Server port number
        #[arg(short, long)]
        port: Option<u16>,

        /// Path to configuration file
        #[arg(long, default_value = "")]
        config_file: String,
    },

    /// Show or initialize the configuration file
    Config {
        /// Write a configuration file with default values
        #[arg(long)]
        init: bool,

        /// Path to configuration file
        #[arg(long, default_value = "~/.config/medauth/config.toml")]
        config_file: String,
    },

    /// Ask a patient to authorize a requester and wait for the decision
    ///
    /// Exits non-zero when access is denied or the request times out.
    ///
    /// Examples:
    ///   medauth request alice "Dr. Smith" --primary "+1 555 000 0001"
    ///   medauth request alice "Dr. Smith" --primary +15550000001 \
    ///       --secondary +15550000002 --emergency --channel whatsapp --timeout 60
    Request {
        /// Username of the patient whose documents are requested
        subject: String,

        /// Name of the doctor or organization asking for access
        requester: String,

        /// Phone number of the patient
        #[arg(long)]
        primary: String,

        /// Emergency contact, notified only with --emergency
        #[arg(long)]
        secondary: Option<String>,

        /// Notify the emergency contact as well
        #[arg(long)]
        emergency: bool,

        /// Delivery channel (sms or whatsapp)
        #[arg(short, long, default_value = "sms")]
        channel: String,

        /// Wait window in seconds (server default when omitted)
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Server URL
        #[arg(long, default_value = "http://127.0.0.1:3535")]
        server: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Confirm or cancel a pending authorization
    Resolve {
        /// Authorization request id
        id: String,

        /// confirm or cancel
        action: String,

        /// Server URL
        #[arg(long, default_value = "http://127.0.0.1:3535")]
        server: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show a pending authorization
    Status {
        /// Authorization request id
        id: String,

        /// Server URL
        #[arg(long, default_value = "http://127.0.0.1:3535")]
        server: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            host,
            port,
            config_file,
        } => {
            handlers::handle_serve(host, port, config_file).await?;
        }
        Commands::Config { init, config_file } => {
            if init {
                handlers::handle_config_init(config_file).await?;
            } else {
                handlers::handle_config_show(config_file).await?;
            }
        }
        Commands::Request {
            subject,
            requester,
            primary,
            secondary,
            emergency,
            channel,
            timeout,
            server,
            json,
        } => {
            let call = handlers::build_call(
                subject, requester, primary, secondary, emergency, &channel, timeout,
            )?;
            handlers::handle_request(call, server, json).await?;
        }
        Commands::Resolve {
            id,
            action,
            server,
            json,
        } => {
            handlers::handle_resolve(id, action, server, json).await?;
        }
        Commands::Status { id, server } => {
            handlers::handle_status(id, server).await?;
        }
    }

    Ok(())
}
