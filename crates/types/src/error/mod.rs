// Path: crates/types/src/error/mod.rs
//! The shared error taxonomy for the PoP consensus core.
//!
//! Errors are partitioned by recoverability per §7 of the specification:
//! local-recoverable (logged and discarded), protocol-visible-but-non-fatal
//! (triggers a view change), slashable-on-others (evidence is built and
//! gossiped), and fatal (the replica halts and emits a signed alarm). Each
//! domain below documents which partition its variants fall into.

use thiserror::Error;

/// A trait for assigning a stable, machine-readable string code to an error.
///
/// Codes are part of the wire/log contract: they must not change once
/// shipped, even if the associated `Display` message is reworded.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// Errors from the canonical codec (§7: local-recoverable; a malformed
/// message is discarded and never advances state).
#[derive(Error, Debug)]
pub enum CodecError {
    /// The input bytes did not decode to the requested type.
    #[error("canonical decode failed: {0}")]
    Decode(String),
}

impl ErrorCode for CodecError {
    fn code(&self) -> &'static str {
        match self {
            Self::Decode(_) => "CODEC_DECODE_FAILED",
        }
    }
}

/// Errors from parsing or validating the replica configuration surface (§6).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required field was missing.
    #[error("missing configuration field: {0}")]
    MissingField(&'static str),
    /// A field's value was outside its valid range.
    #[error("invalid configuration value for {field}: {reason}")]
    InvalidValue {
        /// The offending field name.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
    /// The committee size does not satisfy `n = 3f + 1`.
    #[error("committee size {n} does not satisfy n = 3f + 1")]
    InvalidCommitteeSize {
        /// The configured committee size.
        n: usize,
    },
}

impl ErrorCode for ConfigError {
    fn code(&self) -> &'static str {
        match self {
            Self::MissingField(_) => "CONFIG_MISSING_FIELD",
            Self::InvalidValue { .. } => "CONFIG_INVALID_VALUE",
            Self::InvalidCommitteeSize { .. } => "CONFIG_INVALID_COMMITTEE_SIZE",
        }
    }
}

/// Errors from the Merkle state store (§4.2).
///
/// `Backend` and `Corrupt` are §7 Fatal: the replica halts rather than
/// guess at recovery. The rest are protocol-visible-but-non-fatal.
#[derive(Error, Debug)]
pub enum StateError {
    /// The requested key was not present in the tree.
    #[error("key not found in state")]
    KeyNotFound,
    /// A write batch failed the conservation check for one or more domains.
    #[error("conservation violated for domain {domain}: delta {delta}")]
    ConservationViolation {
        /// The conserved domain whose delta was non-zero.
        domain: u8,
        /// The non-zero net delta observed.
        delta: i128,
    },
    /// An inclusion proof did not verify against the claimed root.
    #[error("inclusion proof did not verify against the claimed root")]
    ProofDidNotVerify,
    /// The requested snapshot handle is unknown or has been garbage-collected.
    #[error("unknown or expired snapshot handle: {0}")]
    UnknownSnapshot(u64),
    /// Fatal: the storage backend reported an unrecoverable error.
    #[error("state backend error: {0}")]
    Backend(String),
    /// Fatal: the tree's internal structure failed an integrity check.
    #[error("state tree integrity check failed: {0}")]
    Corrupt(String),
}

impl ErrorCode for StateError {
    fn code(&self) -> &'static str {
        match self {
            Self::KeyNotFound => "STATE_KEY_NOT_FOUND",
            Self::ConservationViolation { .. } => "STATE_CONSERVATION_VIOLATION",
            Self::ProofDidNotVerify => "STATE_PROOF_NO_VERIFY",
            Self::UnknownSnapshot(_) => "STATE_UNKNOWN_SNAPSHOT",
            Self::Backend(_) => "STATE_BACKEND_ERROR",
            Self::Corrupt(_) => "STATE_CORRUPT",
        }
    }
}

impl StateError {
    /// True for variants the engine must treat as §7 Fatal.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Backend(_) | Self::Corrupt(_))
    }
}

/// Reasons a proof was rejected during mempool admission (§4.1).
///
/// All variants are §7 local-recoverable: admission failures never produce
/// consensus messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    /// The proof failed a basic structural check (size, empty payload, ...).
    #[error("malformed proof")]
    Malformed,
    /// The submitter's signature over the proof did not verify.
    #[error("invalid submitter signature")]
    InvalidSignature,
    /// A proof with this `id` is already known to the mempool.
    #[error("duplicate proof id")]
    Duplicate,
    /// The submitter has exceeded its configured admission rate.
    #[error("submitter rate limit exceeded")]
    RateLimited,
    /// Verification exceeded `verify_budget`; not admitted, not slashable.
    #[error("proof verification exceeded its time/memory budget")]
    Timeout,
    /// The logical engine classified the proof as invalid.
    #[error("proof failed logical verification: {0}")]
    FailedVerification(String),
    /// The proof's difficulty is below `min_difficulty`.
    #[error("difficulty {got} below minimum {min}")]
    BelowMinDifficulty {
        /// The proof's computed difficulty.
        got: u32,
        /// The configured minimum.
        min: u32,
    },
}

impl ErrorCode for AdmissionError {
    fn code(&self) -> &'static str {
        match self {
            Self::Malformed => "ADMISSION_MALFORMED",
            Self::InvalidSignature => "ADMISSION_INVALID_SIGNATURE",
            Self::Duplicate => "ADMISSION_DUPLICATE",
            Self::RateLimited => "ADMISSION_RATE_LIMITED",
            Self::Timeout => "ADMISSION_TIMEOUT",
            Self::FailedVerification(_) => "ADMISSION_FAILED_VERIFICATION",
            Self::BelowMinDifficulty { .. } => "ADMISSION_BELOW_MIN_DIFFICULTY",
        }
    }
}

/// Errors from the BFT consensus engine (§4.3).
#[derive(Error, Debug)]
pub enum ConsensusError {
    /// A message referenced a `(height, view)` the engine has already moved past.
    #[error("stale view: message for (h={h}, v={v}) but replica is at (h={cur_h}, v={cur_v})")]
    StaleView {
        /// Message height.
        h: u64,
        /// Message view.
        v: u64,
        /// Replica's current height.
        cur_h: u64,
        /// Replica's current view.
        cur_v: u64,
    },
    /// A `PrePrepare` was signed by a replica other than `leader(h, v)`.
    #[error("pre-prepare for (h={h}, v={v}) not signed by the expected leader")]
    NotLeader {
        /// Height.
        h: u64,
        /// View.
        v: u64,
    },
    /// A signature over a consensus message did not verify.
    #[error("invalid signature on {0}")]
    InvalidSignature(&'static str),
    /// The proposed block's `prev_block_hash` did not match the committed tip.
    #[error("prev_block_hash mismatch")]
    PrevHashMismatch,
    /// The proposed block's timestamp fell outside `clock_skew`.
    #[error("timestamp outside permitted clock skew")]
    ClockSkewExceeded,
    /// A proof inside the proposed block failed verification or was already committed.
    #[error("block contains an invalid or already-committed proof")]
    InvalidProofInBlock,
    /// The simulated post-root did not match the block's `expected_post_root`.
    #[error("post-root mismatch: simulated {simulated} != expected {expected}")]
    PostRootMismatch {
        /// Hex-encoded simulated root.
        simulated: String,
        /// Hex-encoded claimed root.
        expected: String,
    },
    /// The proposed transition was not conservation-valid.
    #[error("conservation check failed: {0}")]
    ConservationFailed(#[from] StateError),
    /// A quorum certificate did not contain `>= 2f+1` distinct-replica signatures.
    #[error("quorum not reached: {got} of {needed} required")]
    QuorumNotReached {
        /// Signatures actually present.
        got: usize,
        /// Signatures required (`2f+1`).
        needed: usize,
    },
    /// Fatal: the committee's public-key set failed an integrity check.
    #[error("committee integrity failure: {0}")]
    CommitteeIntegrity(String),
    /// Fatal: the signer component is unreachable or refused to sign.
    #[error("signer unavailable: {0}")]
    SignerUnavailable(String),
}

impl ErrorCode for ConsensusError {
    fn code(&self) -> &'static str {
        match self {
            Self::StaleView { .. } => "CONSENSUS_STALE_VIEW",
            Self::NotLeader { .. } => "CONSENSUS_NOT_LEADER",
            Self::InvalidSignature(_) => "CONSENSUS_INVALID_SIGNATURE",
            Self::PrevHashMismatch => "CONSENSUS_PREV_HASH_MISMATCH",
            Self::ClockSkewExceeded => "CONSENSUS_CLOCK_SKEW_EXCEEDED",
            Self::InvalidProofInBlock => "CONSENSUS_INVALID_PROOF_IN_BLOCK",
            Self::PostRootMismatch { .. } => "CONSENSUS_POST_ROOT_MISMATCH",
            Self::ConservationFailed(_) => "CONSENSUS_CONSERVATION_FAILED",
            Self::QuorumNotReached { .. } => "CONSENSUS_QUORUM_NOT_REACHED",
            Self::CommitteeIntegrity(_) => "CONSENSUS_COMMITTEE_INTEGRITY",
            Self::SignerUnavailable(_) => "CONSENSUS_SIGNER_UNAVAILABLE",
        }
    }
}

impl ConsensusError {
    /// True for variants the engine must treat as §7 Fatal (halt + signed alarm).
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::CommitteeIntegrity(_) | Self::SignerUnavailable(_) => true,
            Self::ConservationFailed(e) => e.is_fatal(),
            _ => false,
        }
    }
}

/// Errors from the Byzantine classifier (§4.4).
///
/// All variants are local-recoverable: "Classifiers never act on unsigned
/// or unverifiable reports" — a rejected report is simply dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifierError {
    /// The evidence bundle's signature(s) did not verify.
    #[error("evidence signature invalid")]
    InvalidSignature,
    /// The evidence was already recorded (replay of a processed offence).
    #[error("duplicate evidence id")]
    DuplicateEvidence,
    /// The evidence does not, on its own, prove the claimed offence.
    #[error("evidence does not substantiate the claimed offence")]
    Unsubstantiated,
}

impl ErrorCode for ClassifierError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidSignature => "CLASSIFIER_INVALID_SIGNATURE",
            Self::DuplicateEvidence => "CLASSIFIER_DUPLICATE_EVIDENCE",
            Self::Unsubstantiated => "CLASSIFIER_UNSUBSTANTIATED",
        }
    }
}

/// Errors from the network façade (§4.5).
///
/// All variants are local-recoverable and transient.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Sending to a specific peer failed.
    #[error("send to peer failed: {0}")]
    Send(String),
    /// Broadcasting to a topic failed.
    #[error("broadcast failed: {0}")]
    Broadcast(String),
    /// Subscribing to a topic failed.
    #[error("subscribe failed: {0}")]
    Subscribe(String),
    /// An inbound message failed to decode.
    #[error("decode error: {0}")]
    Decode(String),
    /// An internal transport error not covered above.
    #[error("internal transport error: {0}")]
    Internal(String),
}

impl ErrorCode for TransportError {
    fn code(&self) -> &'static str {
        match self {
            Self::Send(_) => "TRANSPORT_SEND_FAILED",
            Self::Broadcast(_) => "TRANSPORT_BROADCAST_FAILED",
            Self::Subscribe(_) => "TRANSPORT_SUBSCRIBE_FAILED",
            Self::Decode(_) => "TRANSPORT_DECODE_ERROR",
            Self::Internal(_) => "TRANSPORT_INTERNAL",
        }
    }
}

/// Errors from the persistence layer (§6's persisted-state layout).
///
/// `Backend` and `Corrupt` are §7 Fatal, matching [`StateError`]'s split:
/// a replica cannot safely guess at recovery from a broken disk store.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The requested key was not present under its table/prefix.
    #[error("key not found in storage")]
    NotFound,
    /// A stored value failed to decode back into its expected type.
    #[error("stored value failed to decode: {0}")]
    Decode(#[from] CodecError),
    /// Fatal: the underlying database reported an unrecoverable error.
    #[error("storage backend error: {0}")]
    Backend(String),
    /// Fatal: a structural invariant of the persisted layout was violated.
    #[error("storage layout corrupt: {0}")]
    Corrupt(String),
}

impl ErrorCode for StorageError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "STORAGE_NOT_FOUND",
            Self::Decode(_) => "STORAGE_DECODE_FAILED",
            Self::Backend(_) => "STORAGE_BACKEND_ERROR",
            Self::Corrupt(_) => "STORAGE_CORRUPT",
        }
    }
}

impl StorageError {
    /// True for variants the engine must treat as §7 Fatal.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Backend(_) | Self::Corrupt(_))
    }
}

/// Errors from cryptographic operations (signing, verification, hashing).
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Key material was malformed or the wrong length.
    #[error("invalid key: {0}")]
    InvalidKey(String),
    /// A signature was malformed or the wrong length.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    /// Signature verification failed (well-formed, but did not verify).
    #[error("signature verification failed")]
    VerificationFailed,
    /// A digest had an unexpected length.
    #[error("invalid hash length: expected {expected}, got {got}")]
    InvalidHashLength {
        /// Expected digest length.
        expected: usize,
        /// Actual digest length.
        got: usize,
    },
    /// An underlying cryptographic primitive reported an error.
    #[error("primitive error: {0}")]
    Primitive(String),
}

impl ErrorCode for CryptoError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidKey(_) => "CRYPTO_INVALID_KEY",
            Self::InvalidSignature(_) => "CRYPTO_INVALID_SIGNATURE",
            Self::VerificationFailed => "CRYPTO_VERIFICATION_FAILED",
            Self::InvalidHashLength { .. } => "CRYPTO_INVALID_HASH_LENGTH",
            Self::Primitive(_) => "CRYPTO_PRIMITIVE_ERROR",
        }
    }
}

/// Top-level umbrella error for code paths that span multiple domains
/// (e.g. `pop-node`'s wiring layer).
#[derive(Error, Debug)]
pub enum CoreError {
    /// A codec error.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// A configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A state-store error.
    #[error(transparent)]
    State(#[from] StateError),
    /// A persistence-layer error.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// A consensus-engine error.
    #[error(transparent)]
    Consensus(#[from] ConsensusError),
    /// A transport error.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// A cryptographic error.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    /// A custom, unspecified error for situations not covered above.
    #[error("{0}")]
    Custom(String),
}

impl ErrorCode for CoreError {
    fn code(&self) -> &'static str {
        match self {
            Self::Codec(e) => e.code(),
            Self::Config(e) => e.code(),
            Self::State(e) => e.code(),
            Self::Storage(e) => e.code(),
            Self::Consensus(e) => e.code(),
            Self::Transport(e) => e.code(),
            Self::Crypto(e) => e.code(),
            Self::Custom(_) => "CORE_CUSTOM_ERROR",
        }
    }
}
