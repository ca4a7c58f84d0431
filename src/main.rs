use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use rs_couchbase::{
    read_config, AuthDomain, ClientConfig, Cluster, ConnectionString, CouchbaseClient,
    DirectoryDriver, PasswordAuthenticator, Role,
};
use serde_json::Value;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// rs-couchbase - move JSON documents and sub-document keys in and out of a document store
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON file with uri, username, password and authDomain.
    /// Flags and environment variables override its values.
    #[arg(short, long, env = "RS_COUCHBASE_CONFIG")]
    config: Option<PathBuf>,

    /// Connection string, e.g. file:///var/lib/rs-couchbase
    #[arg(long, env = "RS_COUCHBASE_URI")]
    uri: Option<String>,

    #[arg(short, long, env = "RS_COUCHBASE_USERNAME")]
    username: Option<String>,

    #[arg(short, long, env = "RS_COUCHBASE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Auth domain for user listing and creation (local or external)
    #[arg(long)]
    auth_domain: Option<AuthDomain>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a directory store with the given admin credentials and buckets
    Init {
        #[arg(long = "bucket")]
        buckets: Vec<String>,
    },
    /// Upsert a JSON file as a document
    ImportFile {
        file: PathBuf,
        bucket: String,
        document_id: String,
    },
    /// Write a document to a JSON file
    ExportFile {
        bucket: String,
        document_id: String,
        file: PathBuf,
    },
    /// Upsert a document given as a JSON argument
    Import {
        bucket: String,
        document_id: String,
        json: String,
    },
    /// Print a document
    Export { bucket: String, document_id: String },
    /// Print the value at a sub-document path
    GetKey {
        bucket: String,
        document_id: String,
        key: String,
    },
    /// Upsert a JSON value at a sub-document path
    SetKey {
        bucket: String,
        document_id: String,
        key: String,
        value: String,
    },
    /// Print the users of the configured auth domain
    ListUsers,
    /// Create or update a user
    CreateUser {
        name: String,
        user_password: String,
        /// Role such as admin or data_reader[travel]; repeat for several
        #[arg(long = "role")]
        roles: Vec<Role>,
    },
}

/// Merge the optional config file with flags and environment.
async fn resolve_config(args: &Args) -> anyhow::Result<ClientConfig> {
    let mut config = match &args.config {
        Some(path) => read_config(path)
            .await
            .with_context(|| format!("reading config {}", path.display()))?
            .with_context(|| format!("config file {} does not exist", path.display()))?,
        None => ClientConfig::default(),
    };

    if let Some(uri) = &args.uri {
        config.uri = uri.clone();
    }
    if let Some(username) = &args.username {
        config.username = username.clone();
    }
    if let Some(password) = &args.password {
        config.password = password.clone();
    }
    if let Some(domain) = args.auth_domain {
        config.auth_domain = domain;
    }

    if config.uri.is_empty() {
        bail!("no connection string: pass --uri or set RS_COUCHBASE_URI");
    }
    Ok(config)
}

fn parse_json(raw: &str) -> anyhow::Result<Value> {
    serde_json::from_str(raw).with_context(|| format!("'{}' is not valid JSON", raw))
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run<C: Cluster>(client: &CouchbaseClient<C>, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Init { .. } => bail!("init is handled before connecting"),
        Command::ImportFile {
            file,
            bucket,
            document_id,
        } => client.import_json_file(&file, &bucket, &document_id).await?,
        Command::ExportFile {
            bucket,
            document_id,
            file,
        } => client.export_json_file(&bucket, &document_id, &file).await?,
        Command::Import {
            bucket,
            document_id,
            json,
        } => {
            client
                .import_json(&parse_json(&json)?, &bucket, &document_id)
                .await?
        }
        Command::Export {
            bucket,
            document_id,
        } => print_json(&client.export_json(&bucket, &document_id).await?)?,
        Command::GetKey {
            bucket,
            document_id,
            key,
        } => print_json(&client.export_key(&bucket, &document_id, &key).await?)?,
        Command::SetKey {
            bucket,
            document_id,
            key,
            value,
        } => {
            client
                .import_key(&bucket, &document_id, &key, &parse_json(&value)?)
                .await?
        }
        Command::ListUsers => print_json(&client.list_users().await?)?,
        Command::CreateUser {
            name,
            user_password,
            roles,
        } => client.create_user(&name, &user_password, &roles).await?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays machine-readable
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let config = resolve_config(&args).await?;

    let connection_string = ConnectionString::parse(&config.uri)?;
    if connection_string.scheme != "file" {
        bail!(
            "unsupported scheme '{}': only file:// stores can be reached from the command line",
            connection_string.scheme
        );
    }
    let driver = DirectoryDriver::new();

    if let Command::Init { buckets } = &args.command {
        let root = PathBuf::from(connection_string.path.clone().unwrap_or_default());
        let admin = PasswordAuthenticator::new(&config.username, &config.password);
        driver.initialize(&root, &admin, buckets).await?;
        info!(root = %root.display(), buckets = ?buckets, "Initialized store");
        return Ok(());
    }

    let client = CouchbaseClient::connect_with_config(&driver, &config).await?;
    run(&client, args.command).await
}
