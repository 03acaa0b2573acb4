//! rounddrop
//!
//! Command-line front end for a round-based, signature-gated distribution
//! ledger. Every entry point of the ledger is a subcommand; the caller is the
//! account of the keypair in `--keyfile`.
//!
//! Usage:
//!   rounddrop keygen
//!   rounddrop deploy          --params <json>
//!   rounddrop setup-rounds    --start-times <t,..> --allocations <a,..>
//!   rounddrop deposit         --rounds <i,..>
//!   rounddrop claim           --round <i> --amount <n> --signature <hex|file>
//!   rounddrop status
//!   rounddrop events

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;

use rounddrop_core::types::{AccountId, Amount, DilithiumSignature, RoundIndex, Timestamp};
use rounddrop_crypto::KeyPair;
use rounddrop_query::RoundQuery;
use rounddrop_state::{CallContext, DbToken, DistributionEngine, LedgerDb, TokenLedger};

mod params;
use params::{parse_account, LedgerParams};

// ── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "rounddrop",
    version,
    about = "RoundDrop: round-based, signature-gated token distribution"
)]
struct Args {
    /// Directory for the ledger database.
    #[arg(long, global = true, default_value = "~/.rounddrop/data")]
    data_dir: PathBuf,

    /// Path to the caller's keyfile (JSON).
    #[arg(long, global = true, default_value = "~/.rounddrop/key.json")]
    keyfile: PathBuf,

    /// Override the clock: Unix seconds or RFC 3339.
    #[arg(long, global = true)]
    now: Option<String>,

    /// Print views as JSON.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a new Dilithium2 keypair and save it to the keyfile.
    Keygen,

    /// Deploy a fresh ledger (and its reference token) into the data dir.
    Deploy {
        /// JSON deployment parameters.
        #[arg(long)]
        params: PathBuf,
    },

    /// Configure every round at once (owner).
    SetupRounds {
        /// Strictly increasing start times, comma-separated.
        #[arg(long, value_delimiter = ',', required = true)]
        start_times: Vec<String>,
        /// Per-round allocations, comma-separated.
        #[arg(long, value_delimiter = ',', required = true)]
        allocations: Vec<Amount>,
    },

    /// Set the claim deadline (owner).
    UpdateDeadline {
        #[arg(long)]
        deadline: String,
    },

    /// Replace the operator (owner).
    UpdateOperator {
        /// New operator account (base-58).
        #[arg(long)]
        operator: String,
    },

    /// Start a two-step ownership transfer (owner).
    TransferOwnership {
        #[arg(long)]
        new_owner: String,
    },

    /// Complete a pending ownership transfer (pending owner).
    AcceptOwnership,

    /// Give up ownership permanently (owner).
    RenounceOwnership,

    /// Finance rounds with their full allocations (operator).
    Deposit {
        #[arg(long, value_delimiter = ',', required = true)]
        rounds: Vec<RoundIndex>,
    },

    /// Sweep unclaimed tokens after the deadline (operator).
    Withdraw,

    /// Redeem one claim certificate.
    Claim {
        #[arg(long)]
        round: RoundIndex,
        #[arg(long)]
        amount: Amount,
        /// Certificate as hex, or a path to a file containing the hex.
        #[arg(long)]
        signature: String,
    },

    /// Redeem several certificates in one call.
    ClaimMultiple {
        #[arg(long, value_delimiter = ',', required = true)]
        rounds: Vec<RoundIndex>,
        #[arg(long, value_delimiter = ',', required = true)]
        amounts: Vec<Amount>,
        /// Certificates (hex or file paths), comma-separated, in round order.
        #[arg(long, value_delimiter = ',', required = true)]
        signatures: Vec<String>,
    },

    /// Stop claims (owner).
    Pause,

    /// Resume claims (owner).
    Unpause,

    /// Irreversibly freeze a paused ledger (owner).
    Freeze,

    /// Move the entire custody balance out of a frozen ledger (owner).
    EmergencyExit {
        #[arg(long)]
        receiver: String,
    },

    /// Issue reference tokens to an account.
    Mint {
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: Amount,
    },

    /// Let `spender` (default: the ledger) pull tokens from the caller.
    Approve {
        #[arg(long)]
        spender: Option<String>,
        #[arg(long)]
        amount: Amount,
    },

    /// Token balance of an account (default: the caller).
    Balance {
        #[arg(long)]
        account: Option<String>,
        /// Show the ledger's custody balance instead.
        #[arg(long, default_value_t = false)]
        ledger: bool,
    },

    /// Ledger summary and round schedule.
    Status,

    /// Describe one round.
    Round {
        #[arg(long)]
        index: RoundIndex,
    },

    /// Whether an account has claimed a round.
    HasClaimed {
        /// Account to check (default: the caller).
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        round: RoundIndex,
    },

    /// Print the digest a certificate for (user, round, amount) must sign.
    Digest {
        #[arg(long)]
        user: String,
        #[arg(long)]
        round: RoundIndex,
        #[arg(long)]
        amount: Amount,
    },

    /// Print the event log.
    Events,
}

// ── Main ─────────────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,rounddrop=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let data_dir = expand_tilde(&args.data_dir);
    let keyfile = expand_tilde(&args.keyfile);
    let now = match &args.now {
        Some(s) => parse_time(s)?,
        None => chrono::Utc::now().timestamp(),
    };

    match args.command {
        Command::Keygen => cmd_keygen(&keyfile),
        Command::Deploy { params } => cmd_deploy(&data_dir, &params, now),
        command => {
            let ledger = Ledger::open(&data_dir)?;
            run(&ledger, command, &keyfile, now, args.json)
        }
    }
}

/// Everything a command needs from an already deployed data dir.
struct Ledger {
    db: Arc<LedgerDb>,
    token: Arc<DbToken>,
    engine: DistributionEngine,
}

impl Ledger {
    fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let db = Arc::new(
            LedgerDb::open(data_dir)
                .with_context(|| format!("opening ledger database at {}", data_dir.display()))?,
        );
        let token = Arc::new(DbToken::open(&db).context("opening reference token")?);
        let engine = DistributionEngine::open(db.clone(), token.clone())
            .context("no ledger here; run `rounddrop deploy` first")?;
        Ok(Self { db, token, engine })
    }
}

fn run(ledger: &Ledger, command: Command, keyfile: &Path, now: Timestamp, json: bool) -> anyhow::Result<()> {
    let engine = &ledger.engine;
    let caller = || -> anyhow::Result<CallContext> {
        Ok(CallContext::new(load_keypair(keyfile)?.account_id.clone(), now))
    };

    match command {
        Command::Keygen | Command::Deploy { .. } => bail!("keygen and deploy do not need an open ledger"),

        Command::SetupRounds { start_times, allocations } => {
            let starts = start_times
                .iter()
                .map(|s| parse_time(s))
                .collect::<anyhow::Result<Vec<_>>>()?;
            engine.setup_rounds(&caller()?, &starts, &allocations)?;
            println!("Configured {} rounds.", starts.len());
        }

        Command::UpdateDeadline { deadline } => {
            let deadline = parse_time(&deadline)?;
            engine.update_deadline(&caller()?, deadline)?;
            println!("Deadline set to {}.", format_time(deadline));
        }

        Command::UpdateOperator { operator } => {
            let operator = parse_account(&operator)?;
            engine.update_operator(&caller()?, operator.clone())?;
            println!("Operator is now {}.", operator);
        }

        Command::TransferOwnership { new_owner } => {
            let new_owner = parse_account(&new_owner)?;
            engine.transfer_ownership(&caller()?, new_owner.clone())?;
            println!("Ownership transfer to {} started; awaiting acceptance.", new_owner);
        }

        Command::AcceptOwnership => {
            let ctx = caller()?;
            engine.accept_ownership(&ctx)?;
            println!("{} is now the owner.", ctx.caller);
        }

        Command::RenounceOwnership => {
            engine.renounce_ownership(&caller()?)?;
            println!("Ownership renounced.");
        }

        Command::Deposit { rounds } => {
            engine.deposit(&caller()?, &rounds).context("deposit rejected")?;
            println!("Financed rounds {:?}.", rounds);
        }

        Command::Withdraw => {
            let ctx = caller()?;
            let before = ledger.token.balance_of(&ctx.caller)?;
            engine.withdraw(&ctx).context("withdraw rejected")?;
            let after = ledger.token.balance_of(&ctx.caller)?;
            println!("Withdrew {} tokens.", after.saturating_sub(before));
        }

        Command::Claim { round, amount, signature } => {
            let certificate = read_signature(&signature)?;
            let ctx = caller()?;
            engine
                .claim(&ctx, round, amount, &certificate)
                .context("claim rejected")?;
            info!(user = %ctx.caller, round, amount, "claim submitted");
            println!("Claimed {} tokens from round {}.", amount, round);
        }

        Command::ClaimMultiple { rounds, amounts, signatures } => {
            let certificates = signatures
                .iter()
                .map(|s| read_signature(s))
                .collect::<anyhow::Result<Vec<_>>>()?;
            engine
                .claim_multiple(&caller()?, &rounds, &amounts, &certificates)
                .context("claim rejected")?;
            let total: Amount = amounts.iter().sum();
            println!("Claimed {} tokens from rounds {:?}.", total, rounds);
        }

        Command::Pause => {
            engine.pause(&caller()?)?;
            println!("Ledger paused.");
        }

        Command::Unpause => {
            engine.unpause(&caller()?)?;
            println!("Ledger resumed.");
        }

        Command::Freeze => {
            engine.freeze(&caller()?)?;
            println!("Ledger frozen. This cannot be undone.");
        }

        Command::EmergencyExit { receiver } => {
            let receiver = parse_account(&receiver)?;
            let balance = engine.custody_balance()?;
            engine.emergency_exit(&caller()?, receiver.clone())?;
            println!("Moved {} tokens to {}.", balance, receiver);
        }

        Command::Mint { to, amount } => {
            let to = parse_account(&to)?;
            ledger.token.mint(&to, amount)?;
            println!("Minted {} to {}.", amount, to);
        }

        Command::Approve { spender, amount } => {
            let owner = caller()?.caller;
            let spender = match spender {
                Some(s) => parse_account(&s)?,
                None => engine.ledger_id().clone(),
            };
            ledger.token.approve(&owner, &spender, amount)?;
            println!("Allowance of {} for {} set to {}.", owner, spender, amount);
        }

        Command::Balance { account, ledger: custody } => {
            let account = if custody {
                engine.ledger_id().clone()
            } else {
                account_or_caller(account, keyfile)?
            };
            println!("Account:  {}", account);
            println!("Balance:  {}", ledger.token.balance_of(&account)?);
        }

        Command::Status => {
            let query = RoundQuery::new(&ledger.db);
            let summary = query.summary(now)?;
            let schedule = query.schedule(now)?;
            if json {
                let out = serde_json::json!({ "summary": summary, "schedule": schedule });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("{}", summary);
                println!("Custody balance:   {}", engine.custody_balance()?);
                for entry in schedule {
                    println!(
                        "  round {:>3}  starts {}  allocation {:>10}  claimed {:>10}  {}",
                        entry.index,
                        format_time(entry.start_time),
                        entry.allocation,
                        entry.claimed,
                        entry.status
                    );
                }
            }
        }

        Command::Round { index } => {
            let query = RoundQuery::new(&ledger.db);
            if json {
                let record = query
                    .get(index)?
                    .with_context(|| format!("round {index} is not set up"))?;
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                println!("{}", query.describe(index, now)?);
            }
        }

        Command::HasClaimed { user, round } => {
            let user = account_or_caller(user, keyfile)?;
            println!("{}", engine.has_claimed(&user, round)?);
        }

        Command::Digest { user, round, amount } => {
            let user = parse_account(&user)?;
            println!("{}", engine.claim_digest(&user, round, amount).to_hex());
        }

        Command::Events => {
            for (id, event) in ledger.db.events()? {
                if json {
                    println!("{}", serde_json::to_string(&serde_json::json!({ "id": id, "event": event }))?);
                } else {
                    println!("#{:<6} {}", id, event);
                }
            }
        }
    }
    Ok(())
}

// ── Commands that run without a deployed ledger ──────────────────────────────

fn cmd_keygen(keyfile: &Path) -> anyhow::Result<()> {
    if keyfile.exists() {
        bail!(
            "Keyfile {} already exists. Delete it first to generate a new key.",
            keyfile.display()
        );
    }
    if let Some(parent) = keyfile.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let kp = KeyPair::generate();
    let json = serde_json::to_string_pretty(&kp)?;
    std::fs::write(keyfile, &json)
        .with_context(|| format!("writing keyfile to {}", keyfile.display()))?;

    println!("Generated new keypair.");
    println!("Account ID: {}", kp.account_id.to_b58());
    println!("Public key: {}", kp.public_key.to_hex());
    println!("Keyfile:    {}", keyfile.display());
    Ok(())
}

fn cmd_deploy(data_dir: &Path, params_path: &Path, now: Timestamp) -> anyhow::Result<()> {
    let params = LedgerParams::load(params_path)?;
    let fee_bps = params.token_fee_bps;
    let deploy = params.into_deploy()?;

    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let db = Arc::new(LedgerDb::open(data_dir).context("opening ledger database")?);
    if db.get_config()?.is_some() {
        bail!("a ledger is already deployed in {}", data_dir.display());
    }
    let token = Arc::new(DbToken::create(&db, fee_bps)?);
    let engine = DistributionEngine::deploy(db.clone(), token, deploy, now)?;
    db.flush()?;

    println!("Ledger deployed.");
    println!("Ledger ID:  {}", engine.ledger_id());
    println!("Domain:     {}", hex::encode(engine.domain().as_bytes()));
    println!("Token tax:  {} bps", fee_bps);
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn load_keypair(keyfile: &Path) -> anyhow::Result<KeyPair> {
    let json = std::fs::read_to_string(keyfile)
        .with_context(|| format!("reading keyfile {}", keyfile.display()))?;
    let kp: KeyPair =
        serde_json::from_str(&json).context("parsing keyfile: is it a valid RoundDrop keyfile?")?;
    Ok(kp)
}

fn account_or_caller(account: Option<String>, keyfile: &Path) -> anyhow::Result<AccountId> {
    match account {
        Some(a) => parse_account(&a),
        None => Ok(load_keypair(keyfile)?.account_id.clone()),
    }
}

/// Hex certificate, inline or in a file.
fn read_signature(arg: &str) -> anyhow::Result<DilithiumSignature> {
    let path = expand_tilde(Path::new(arg));
    let text = if path.is_file() {
        std::fs::read_to_string(&path)
            .with_context(|| format!("reading signature file {}", path.display()))?
    } else {
        arg.to_string()
    };
    DilithiumSignature::from_hex(text.trim()).map_err(|e| anyhow::anyhow!("invalid signature: {e}"))
}

/// Unix seconds or an RFC 3339 timestamp.
fn parse_time(s: &str) -> anyhow::Result<Timestamp> {
    if let Ok(secs) = s.parse::<i64>() {
        return Ok(secs);
    }
    let dt = chrono::DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("invalid time {s:?}: expected Unix seconds or RFC 3339"))?;
    Ok(dt.timestamp())
}

fn format_time(ts: Timestamp) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}

fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unix_and_rfc3339() {
        assert_eq!(parse_time("1700000000").unwrap(), 1_700_000_000);
        assert_eq!(parse_time("1970-01-02T00:00:00Z").unwrap(), 86_400);
        assert!(parse_time("tomorrow").is_err());
    }

    #[test]
    fn formats_known_instant() {
        assert_eq!(format_time(0), "1970-01-01T00:00:00+00:00");
    }

    #[test]
    fn tilde_expands_against_home() {
        let home = std::env::var("HOME").unwrap_or_default();
        if !home.is_empty() {
            assert_eq!(expand_tilde(Path::new("~/x")), PathBuf::from(home).join("x"));
        }
        assert_eq!(expand_tilde(Path::new("/abs")), PathBuf::from("/abs"));
    }
}
