/// ─── RoundDrop Ledger Constants ─────────────────────────────────────────────
///
/// Round-based, signature-gated token distribution.

// ── Time ─────────────────────────────────────────────────────────────────────

/// Seconds per day (UTC).
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Minimum gap between the last round's start and the claim deadline.
/// The owner cannot close claiming earlier than this after the final round opens.
pub const DEADLINE_BUFFER_SECS: i64 = 14 * SECONDS_PER_DAY;

// ── Certificates ─────────────────────────────────────────────────────────────

/// Schema of the domain the claim digest is bound to.
pub const DOMAIN_SCHEMA: &str =
    "RoundDropDomain(string name,string version,uint64 chainId,bytes32 ledger)";

/// Schema of the signed claim tuple.
pub const CLAIM_SCHEMA: &str = "Claim(bytes32 user,uint64 round,uint128 amount)";

/// Default domain name used when deployment params omit one.
pub const DEFAULT_DOMAIN_NAME: &str = "RoundDrop";

/// Default domain version used when deployment params omit one.
pub const DEFAULT_DOMAIN_VERSION: &str = "1";

// ── Token ────────────────────────────────────────────────────────────────────

/// Basis-point denominator for transfer tax rates (100% = 10_000).
pub const BPS_DENOMINATOR: u128 = 10_000;
