use anyhow::{Context, Result};
use chatrace::{
    config::Config,
    probe,
    services::{
        chatrace::{Auth, Client, ClientConfig},
        envelope::Provider,
    },
    utils,
};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use directories::ProjectDirs;
use figment::Figment;
use log::info;

/// ChatRace user API client
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(short, long = "config", default_value_t = default_config_path(), env("APP_CONFIG_PATH"), global = true)]
    pub config_path: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with an emailed OTP code and print the user token
    Login {
        #[arg(short, long)]
        email: String,
        /// OTP code. Prompted for on stdin when omitted
        #[arg(long)]
        code: Option<String>,
    },
    /// Exchange an identity token from Google, Apple or Facebook for a user token
    SocialLogin {
        #[arg(short, long, value_enum)]
        provider: ProviderArg,
        #[arg(short, long)]
        token: String,
    },
    /// Invalidate the configured user token
    Logout,
    /// Send one operation, e.g. `chatrace call conversations.get --account`
    Call(CallArgs),
    /// Check the read-only endpoints one by one and report which work
    Probe,
    /// Log in with an OTP code and write a config file
    GenerateConfig {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        business_id: String,
    },
}

#[derive(Parser)]
struct CallArgs {
    /// Dotted command path: op[.op1[.op2[.op3]]]
    command: String,
    /// Flat JSON object sent as `data`
    #[arg(short, long)]
    data: Option<String>,
    /// Extra top-level field, key=value. Repeatable
    #[arg(short, long = "param")]
    params: Vec<String>,
    /// Send the configured business id as account_id
    #[arg(short, long)]
    account: bool,
    /// Send without the access token header
    #[arg(long)]
    no_auth: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProviderArg {
    Google,
    Apple,
    Facebook,
}

impl From<ProviderArg> for Provider {
    fn from(p: ProviderArg) -> Self {
        match p {
            ProviderArg::Google => Provider::Google,
            ProviderArg::Apple => Provider::Apple,
            ProviderArg::Facebook => Provider::Facebook,
        }
    }
}

fn default_config_path() -> String {
    ProjectDirs::from("com", "chatrace", "chatrace")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .and_then(|path| path.into_os_string().into_string().ok())
        .unwrap_or_else(|| String::from("config.toml"))
}

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let figment = Config::figment(&cli.config_path);
    let loglevel: String = figment
        .extract_inner("loglevel")
        .unwrap_or_else(|_| String::from("info"));
    std::env::set_var("RUST_LOG", loglevel.as_str());
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting chatrace, version {}", VERSION);

    match cli.command {
        Commands::Login { email, code } => {
            let client = endpoint_client(&figment)?;
            let credentials = utils::login(&client, &email, code).await?;
            println!("{}", "Login successful".green());
            println!("User token: {}", credentials.token());
            println!("Store it as chatrace.user_token in {}", cli.config_path);
        }
        Commands::SocialLogin { provider, token } => {
            let client = endpoint_client(&figment)?;
            let credentials = client
                .login_with_provider(provider.into(), &token)
                .await
                .context("social login")?;
            println!("User token: {}", credentials.token());
        }
        Commands::GenerateConfig { email, business_id } => {
            let client = endpoint_client(&figment)?;
            utils::generate_config(&cli.config_path, &client, &email, &business_id).await?;
        }
        Commands::Logout => {
            let config = Config::load(&cli.config_path)?;
            let client = Client::new(&config.client())?;
            client.logout(&config.credentials()).await?;
            println!("{}", "Logged out".green());
        }
        Commands::Call(args) => {
            let config = Config::load(&cli.config_path)?;
            let client = Client::new(&config.client())?;
            let account_id = args
                .account
                .then_some(config.chatrace.business_id.as_str());
            let envelope = utils::call_envelope(
                &args.command,
                args.data.as_deref(),
                &args.params,
                account_id,
            )?;
            let credentials = config.credentials();
            let auth = if args.no_auth {
                Auth::Anonymous
            } else {
                Auth::Token(&credentials)
            };
            let result = client.send(&envelope, auth).await;
            println!("{}: {}", envelope.command(), probe::describe(&result));
            result.with_context(|| format!("{} failed", envelope.command()))?;
        }
        Commands::Probe => {
            let config = Config::load(&cli.config_path)?;
            let client = Client::new(&config.client())?;
            let probes = probe::catalog(&config)?;
            let reports = probe::run(&client, &config, probes).await;
            for report in &reports {
                println!("[{}] {}", report.name, probe::describe(&report.result));
            }
            println!("{}", probe::summary(&reports));
        }
    }
    Ok(())
}

// Login commands only need the endpoint, so they work before a config file
// exists.
fn endpoint_client(figment: &Figment) -> Result<Client> {
    let client_config: ClientConfig = figment
        .focus("chatrace")
        .extract()
        .context("Unable to read [chatrace] url/timeout_secs")?;
    Ok(Client::new(&client_config)?)
}
