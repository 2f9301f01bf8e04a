use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use provenance_core::access::{AccessControlCondition, AccessPolicy};
use provenance_core::actions::{fund_withdraw, FundMode, FundWithdrawRequest};
use provenance_core::config::ToolkitConfig;
use provenance_core::encryption::{FileInput, ProviderKind};
use provenance_core::pipeline::Pipeline;
use provenance_core::query::QueryFilter;
use provenance_core::tags::{self, Tag};
use provenance_core::uploader::{ChunkConfig, UploadEvent};
use provenance_core::wallet::Wallet;
use tracing_subscriber::EnvFilter;

mod session;

use session::{load_wallet, require_currency, CliConnector, Session};

#[derive(Parser)]
#[command(name = "provenance", version, about = "Encrypt, upload, fund and retrieve files on bundler nodes")]
struct Cli {
    /// Node URL, or `local:<dir>` for an on-disk node.
    #[arg(long, global = true)]
    node: Option<String>,

    #[arg(long, global = true)]
    currency: Option<String>,

    /// Gateway base used to fetch uploads by id.
    #[arg(long, global = true)]
    gateway: Option<String>,

    /// Wallet secret key (64 hex chars).
    #[arg(long, global = true, env = "PROVENANCE_KEY", default_value = "provenance.key")]
    key: PathBuf,

    /// Master key of the key network used by encryption providers.
    #[arg(long, global = true, env = "PROVENANCE_KEYNET", default_value = "keynet.key")]
    keynet: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a wallet key.
    Keygen {
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Credit wallet funds on a `local:` node.
    Faucet { amount: String },
    /// Quote the price of storing a file or a byte count.
    Price {
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        bytes: Option<u64>,
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Show the balance loaded on the node.
    Balance,
    Fund { amount: String },
    Withdraw { amount: String },
    /// Upload a file in chunks, funding the node first when needed.
    Upload(UploadArgs),
    /// Encrypt a file under an access policy, then upload it.
    EncryptUpload(EncryptArgs),
    /// Fetch an encrypted upload and decrypt it.
    Decrypt(DecryptArgs),
    /// Search uploads by token, content type and time range.
    Query(QueryArgs),
    /// Show (and verify) the receipt of an upload.
    Receipt { id: String },
}

#[derive(Args)]
struct UploadArgs {
    file: PathBuf,
    #[arg(long)]
    content_type: Option<String>,
    #[arg(long)]
    chunk_size: Option<u64>,
    #[arg(long)]
    batch_size: Option<usize>,
    #[arg(long)]
    max_retries: Option<u32>,
}

#[derive(Args)]
struct EncryptArgs {
    file: PathBuf,
    #[arg(long, default_value = "lit")]
    provider: ProviderKind,
    #[arg(long)]
    content_type: Option<String>,
    /// Require at least this many atomic units on `--policy-chain`
    /// instead of the provider's default policy.
    #[arg(long)]
    min_balance: Option<u128>,
    #[arg(long, default_value = "ethereum")]
    policy_chain: String,
}

#[derive(Args)]
struct DecryptArgs {
    id: String,
    #[arg(long, default_value = "lit")]
    provider: ProviderKind,
    /// Original content type; looked up from the upload's tags when omitted.
    #[arg(long)]
    content_type: Option<String>,
    #[arg(long)]
    out: Option<PathBuf>,
    /// Print the decrypted file as a data URL.
    #[arg(long)]
    data_url: bool,
}

#[derive(Args)]
struct QueryArgs {
    /// Only these transaction ids; repeat the flag for several.
    #[arg(long = "id")]
    ids: Vec<String>,
    #[arg(long)]
    token: Option<String>,
    #[arg(long)]
    content_type: Option<String>,
    /// RFC 3339 lower bound, e.g. 2024-01-01T00:00:00Z.
    #[arg(long)]
    from: Option<String>,
    #[arg(long)]
    to: Option<String>,
    #[arg(long)]
    limit: Option<usize>,
}

impl Cli {
    fn config(&self) -> Result<ToolkitConfig> {
        let mut config = ToolkitConfig::from_env()?;
        if let Some(node) = &self.node {
            config.node = node.clone();
        }
        if let Some(currency) = &self.currency {
            config.currency = Some(currency.clone());
        }
        if let Some(gateway) = &self.gateway {
            config.gateway = provenance_core::gateway::normalize_base(gateway);
        }
        Ok(config)
    }

    async fn session(&self) -> Result<Session> {
        let config = self.config()?;
        let currency = require_currency(&config)?;
        let wallet = load_wallet(&self.key).await?;
        Session::open(config, currency, wallet).await
    }
}

fn guess_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mp3") => "audio/mpeg",
        Some("pdf") => "application/pdf",
        Some("json") => "application/json",
        Some("txt" | "md") => "text/plain",
        Some("html" | "htm") => "text/html",
        _ => tags::OCTET_STREAM,
    }
}

fn millis_from_rfc3339(value: &str) -> Result<u64> {
    let parsed = chrono::DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("`{value}` is not an RFC 3339 timestamp"))?;
    u64::try_from(parsed.timestamp_millis()).with_context(|| format!("`{value}` is before 1970"))
}

fn render_time(millis: u64) -> String {
    i64::try_from(millis)
        .ok()
        .and_then(chrono::DateTime::from_timestamp_millis)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| millis.to_string())
}

//==================== commands ====================//

async fn keygen_cmd(out_dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("creating {}", out_dir.display()))?;
    let sk_path = out_dir.join("provenance.key");
    if tokio::fs::try_exists(&sk_path).await? {
        bail!("{} already exists", sk_path.display());
    }
    let wallet = Wallet::generate();
    tokio::fs::write(&sk_path, wallet.secret_hex()).await?;
    tokio::fs::write(
        out_dir.join("provenance.pub"),
        hex::encode(wallet.public_key().as_bytes()),
    )
    .await?;
    println!("address {}", wallet.address());
    println!("keypair written → {}", out_dir.display());
    Ok(())
}

async fn faucet_cmd(cli: &Cli, amount: &str) -> Result<()> {
    let session = cli.session().await?;
    let Some(store) = &session.local else {
        bail!("faucet only works against a local:<dir> node");
    };
    let currency = session.node.currency();
    let amount = currency.to_atomic(amount)?;
    store
        .deposit(currency, &session.wallet.address(), amount)
        .await?;
    let wallet = store.wallet_balance(currency, &session.wallet.address()).await;
    println!("wallet balance {} {}", currency.from_atomic(wallet), currency.label());
    Ok(())
}

async fn price_cmd(cli: &Cli, bytes: Option<u64>, file: Option<&Path>) -> Result<()> {
    let size = match (bytes, file) {
        (Some(bytes), _) => bytes,
        (None, Some(file)) => tokio::fs::metadata(file)
            .await
            .with_context(|| format!("reading {}", file.display()))?
            .len(),
        (None, None) => bail!("pass --bytes or --file"),
    };
    let session = cli.session().await?;
    let currency = session.node.currency();
    let price = session.node.price(size).await?;
    println!("{size} bytes → {} {}", currency.from_atomic(price), currency.label());
    Ok(())
}

async fn balance_cmd(cli: &Cli) -> Result<()> {
    let session = cli.session().await?;
    let currency = session.node.currency();
    let loaded = session.node.loaded_balance().await?;
    println!(
        "{} on {}: {} {}",
        session.node.address(),
        session.node.url(),
        currency.from_atomic(loaded),
        currency.label()
    );
    Ok(())
}

async fn fund_withdraw_cmd(cli: &Cli, amount: &str, mode: FundMode) -> Result<()> {
    let config = cli.config()?;
    let wallet = load_wallet(&cli.key).await?;
    let request = FundWithdrawRequest {
        node: Some(config.node.clone()),
        currency: config.currency.clone(),
        amount: amount.to_string(),
    };
    let report = fund_withdraw(&CliConnector { wallet }, &request, mode).await;
    if !report.success {
        bail!(report.message);
    }
    match report.receipt {
        Some(tx) => println!("{} (tx {})", report.message, tx.tx_id),
        None => println!("{}", report.message),
    }
    Ok(())
}

async fn upload_cmd(cli: &Cli, args: &UploadArgs) -> Result<()> {
    let session = cli.session().await?;
    let defaults = ChunkConfig::default();
    let config = ChunkConfig {
        chunk_size: args.chunk_size.unwrap_or(defaults.chunk_size),
        batch_size: args.batch_size.unwrap_or(defaults.batch_size),
        max_retries: args.max_retries.unwrap_or(defaults.max_retries),
        retry_delay: defaults.retry_delay,
    };
    config.validate()?;

    let file = tokio::fs::File::open(&args.file)
        .await
        .with_context(|| format!("opening {}", args.file.display()))?;
    let size = file.metadata().await?.len();
    let content_type = args
        .content_type
        .clone()
        .unwrap_or_else(|| guess_content_type(&args.file).to_string());
    let upload_tags = vec![Tag::new(tags::CONTENT_TYPE, content_type)];

    let uploader = provenance_core::uploader::Uploader::new(session.node.clone());
    let mut upload = uploader.chunked(config).start(file, size, upload_tags);
    while let Some(event) = upload.next_event().await {
        match &event {
            UploadEvent::Progress {
                chunks_acknowledged,
                total_chunks,
                ..
            } => {
                let pct = event.percent().unwrap_or(0);
                eprint!("\ruploading {pct:>3}% ({chunks_acknowledged}/{total_chunks} chunks)");
            }
            UploadEvent::ChunkError {
                chunk_index,
                attempt,
                message,
            } => tracing::warn!(chunk = chunk_index, attempt, %message, "chunk failed"),
            UploadEvent::Done(_) => eprintln!(),
        }
    }
    let receipt = upload.finish().await?;
    println!("uploaded {} → {}", args.file.display(), session.gateway_url(&receipt.id));
    println!("{}", serde_json::to_string_pretty(&receipt)?);
    Ok(())
}

async fn encrypt_upload_cmd(cli: &Cli, args: &EncryptArgs) -> Result<()> {
    let session = cli.session().await?;
    let bytes = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("reading {}", args.file.display()))?;
    let name = args
        .file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let content_type = args
        .content_type
        .clone()
        .unwrap_or_else(|| guess_content_type(&args.file).to_string());
    let file = FileInput::new(name, content_type, bytes);

    let policy = args.min_balance.map(|minimum| {
        AccessPolicy::single(AccessControlCondition::balance_at_least(
            args.policy_chain.clone(),
            minimum,
        ))
    });

    let provider = session.provider(args.provider, &cli.keynet).await?;
    let pipeline = Pipeline::new(provider, session.node.clone(), session.gateway.clone());
    let receipt = pipeline.encrypt_and_upload(&file, policy.as_ref()).await?;
    println!(
        "encrypted with {} and uploaded → {}",
        args.provider,
        session.gateway_url(&receipt.id)
    );
    println!("{}", serde_json::to_string_pretty(&receipt)?);
    Ok(())
}

async fn decrypt_cmd(cli: &Cli, args: &DecryptArgs) -> Result<()> {
    let session = cli.session().await?;
    let content_type = match &args.content_type {
        Some(content_type) => content_type.clone(),
        None => session.recorded_content_type(&args.id).await?,
    };
    let provider = session.provider(args.provider, &cli.keynet).await?;
    let pipeline = Pipeline::new(provider, session.node.clone(), session.gateway.clone());
    let blob = pipeline.fetch_and_decrypt(&args.id, &content_type).await?;

    if let Some(out) = &args.out {
        tokio::fs::write(out, &blob.bytes)
            .await
            .with_context(|| format!("writing {}", out.display()))?;
        println!("decrypted {} bytes ({}) → {}", blob.bytes.len(), blob.content_type, out.display());
    } else {
        println!("decrypted {} bytes ({})", blob.bytes.len(), blob.content_type);
    }
    if args.data_url {
        println!("{}", blob.to_data_url());
    }
    Ok(())
}

async fn query_cmd(cli: &Cli, args: &QueryArgs) -> Result<()> {
    let session = cli.session().await?;
    let filter = QueryFilter {
        ids: args.ids.clone(),
        token: args.token.clone(),
        content_type: args.content_type.clone(),
        from: args.from.as_deref().map(millis_from_rfc3339).transpose()?,
        to: args.to.as_deref().map(millis_from_rfc3339).transpose()?,
        limit: args.limit,
    };
    let results = session.query.search(&filter).await?;
    if results.is_empty() {
        println!("no uploads match");
    }
    for tx in results {
        let shown_type = tags::display_content_type(&tx.tags).unwrap_or("-");
        let marker = if tags::is_encrypted(&tx.tags) { " [encrypted]" } else { "" };
        println!(
            "{}  {}  {}  {}{}",
            tx.id,
            render_time(tx.timestamp),
            tx.token,
            shown_type,
            marker
        );
    }
    Ok(())
}

async fn receipt_cmd(cli: &Cli, id: &str) -> Result<()> {
    let session = cli.session().await?;
    let receipt = session.node.receipt(id).await?;
    println!("{}", serde_json::to_string_pretty(&receipt)?);
    match receipt.verify() {
        Ok(()) => println!("signature ok"),
        Err(err) => bail!("receipt does not verify: {err}"),
    }
    Ok(())
}

impl Session {
    fn gateway_url(&self, id: &str) -> String {
        match &self.local {
            Some(store) => format!("{}/{id}", store.url()),
            None => format!("{}{id}", self.config.gateway),
        }
    }

    /// The original content type tagged on an encrypted upload.
    async fn recorded_content_type(&self, id: &str) -> Result<String> {
        let found = self
            .query
            .search(&QueryFilter::by_id(id))
            .await?
            .into_iter()
            .find(|tx| tx.id == id);
        Ok(found
            .as_ref()
            .and_then(|tx| tags::display_content_type(&tx.tags))
            .unwrap_or(tags::OCTET_STREAM)
            .to_string())
    }
}

async fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Keygen { out_dir } => keygen_cmd(out_dir).await,
        Command::Faucet { amount } => faucet_cmd(cli, amount).await,
        Command::Price { bytes, file } => price_cmd(cli, *bytes, file.as_deref()).await,
        Command::Balance => balance_cmd(cli).await,
        Command::Fund { amount } => fund_withdraw_cmd(cli, amount, FundMode::Fund).await,
        Command::Withdraw { amount } => fund_withdraw_cmd(cli, amount, FundMode::Withdraw).await,
        Command::Upload(args) => upload_cmd(cli, args).await,
        Command::EncryptUpload(args) => encrypt_upload_cmd(cli, args).await,
        Command::Decrypt(args) => decrypt_cmd(cli, args).await,
        Command::Query(args) => query_cmd(cli, args).await,
        Command::Receipt { id } => receipt_cmd(cli, id).await,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    run(&cli).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_override_environment_config() {
        let cli = Cli::try_parse_from([
            "provenance",
            "--node",
            "local:/tmp/node",
            "--currency",
            "matic",
            "--gateway",
            "http://localhost:3000",
            "balance",
        ])
        .unwrap();
        let config = cli.config().unwrap();
        assert_eq!(config.node, "local:/tmp/node");
        assert_eq!(config.currency.as_deref(), Some("matic"));
        assert_eq!(config.gateway, "http://localhost:3000/");
    }

    #[test]
    fn providers_parse_by_name() {
        let cli = Cli::try_parse_from(["provenance", "decrypt", "abc", "--provider", "taco"]).unwrap();
        match cli.command {
            Command::Decrypt(args) => assert_eq!(args.provider, ProviderKind::Taco),
            _ => panic!("expected decrypt"),
        }
        assert!(Cli::try_parse_from(["provenance", "decrypt", "abc", "--provider", "nope"]).is_err());
    }

    #[test]
    fn content_types_follow_extensions() {
        assert_eq!(guess_content_type(Path::new("cat.PNG")), "image/png");
        assert_eq!(guess_content_type(Path::new("clip.mp4")), "video/mp4");
        assert_eq!(guess_content_type(Path::new("blob")), tags::OCTET_STREAM);
    }

    #[test]
    fn query_bounds_parse_as_unix_millis() {
        assert_eq!(millis_from_rfc3339("1970-01-01T00:00:01Z").unwrap(), 1_000);
        assert!(millis_from_rfc3339("yesterday").is_err());
        assert!(millis_from_rfc3339("1969-12-31T23:59:59Z").is_err());
        assert_eq!(render_time(0), "1970-01-01T00:00:00+00:00");
    }

    #[tokio::test]
    async fn local_node_round_trip_through_commands() {
        let dir = tempfile::tempdir().unwrap();
        keygen_cmd(dir.path()).await.unwrap();
        assert!(keygen_cmd(dir.path()).await.is_err());

        let node = format!("local:{}", dir.path().join("node").display());
        let key = dir.path().join("provenance.key").display().to_string();
        let file = dir.path().join("note.txt");
        tokio::fs::write(&file, b"hello provenance").await.unwrap();

        let parse = |command: &[&str]| {
            let mut argv = vec!["provenance", "--node", node.as_str(), "--currency", "ethereum", "--key", key.as_str()];
            argv.extend_from_slice(command);
            Cli::try_parse_from(argv).unwrap()
        };
        run(&parse(&["faucet", "1"])).await.unwrap();
        run(&parse(&["fund", "0.001"])).await.unwrap();

        let cli = parse(&["balance"]);
        let args = UploadArgs {
            file,
            content_type: None,
            chunk_size: Some(4),
            batch_size: Some(2),
            max_retries: Some(0),
        };
        upload_cmd(&cli, &args).await.unwrap();

        let session = cli.session().await.unwrap();
        let uploads = session.query.search(&QueryFilter::default()).await.unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(tags::find(&uploads[0].tags, tags::CONTENT_TYPE), Some("text/plain"));
        receipt_cmd(&cli, &uploads[0].id).await.unwrap();
        assert!(faucet_cmd(&parse(&["balance"]), "-1").await.is_err());
    }

    #[test]
    fn query_ids_repeat() {
        let cli = Cli::try_parse_from(["provenance", "query", "--id", "a", "--id", "b"]).unwrap();
        match cli.command {
            Command::Query(args) => assert_eq!(args.ids, ["a", "b"]),
            _ => panic!("expected query"),
        }
    }

    #[tokio::test]
    async fn content_type_lookup_reaches_past_the_newest_page() {
        let dir = tempfile::tempdir().unwrap();
        keygen_cmd(dir.path()).await.unwrap();
        let node = format!("local:{}", dir.path().join("node").display());
        let key = dir.path().join("provenance.key").display().to_string();
        let parse = |command: &[&str]| {
            let mut argv = vec!["provenance", "--node", node.as_str(), "--currency", "ethereum", "--key", key.as_str()];
            argv.extend_from_slice(command);
            Cli::try_parse_from(argv).unwrap()
        };
        run(&parse(&["faucet", "1"])).await.unwrap();
        run(&parse(&["fund", "0.001"])).await.unwrap();

        let session = parse(&["balance"]).session().await.unwrap();
        let sealed = session
            .node
            .upload(b"sealed", &tags::encrypted_upload_tags("image/png"))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let plain = vec![Tag::new(tags::CONTENT_TYPE, "text/plain")];
        for _ in 0..provenance_core::query::DEFAULT_LIMIT + 3 {
            session.node.upload(b"newer", &plain).await.unwrap();
        }

        let page = session.query.search(&QueryFilter::default()).await.unwrap();
        assert!(page.iter().all(|tx| tx.id != sealed.id));
        assert_eq!(session.recorded_content_type(&sealed.id).await.unwrap(), "image/png");
        assert_eq!(session.recorded_content_type("missing").await.unwrap(), tags::OCTET_STREAM);
    }
}
