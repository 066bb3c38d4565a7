use thiserror::Error;

/// Why a typed amount cannot be used. Shown inline next to the input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("invalid input")]
    InvalidInput,

    #[error("enter an amount")]
    ZeroAmount,

    #[error("select a currency")]
    NoCurrency,

    #[error("insufficient balance")]
    InsufficientBalance,
}

/// Raised when the user asks to build/approve a position. Not retried.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("missing position input size")]
    MissingInputSize,

    #[error("please choose a long/short position")]
    MissingPositionSide,

    #[error("please select a leverage value")]
    MissingLeverage,

    #[error("{0}")]
    InvalidAmount(#[from] InputError),

    #[error("no signer configured")]
    NoSigner,

    #[error("signer {signer} does not match the active account")]
    SignerMismatch { signer: String },

    #[error("approval failed: {0}")]
    Submission(String),
}
