//! The deployment script: `MyToken` first, then an `EventContract` bound to it.

use crate::client::{EventContract, Ledger, LedgerError, TokenContract};
use crate::token::TokenParams;
use crate::types::{Address, AmountError, parse_units};
use thiserror::Error;

/// Token name used by the deployment script
pub const TOKEN_NAME: &str = "MyToken";
/// Token symbol used by the deployment script
pub const TOKEN_SYMBOL: &str = "MTK";
/// Token decimals used by the deployment script
pub const TOKEN_DECIMALS: u8 = 18;
/// Initial supply, in whole tokens
pub const INITIAL_SUPPLY: &str = "1000";

/// Why the deployment failed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeployError {
    /// The initial supply constant could not be scaled
    #[error("invalid initial supply: {0}")]
    Supply(#[from] AmountError),

    /// A deployment transaction failed
    #[error("deployment failed: {0}")]
    Ledger(#[from] LedgerError),
}

/// Handles to the freshly deployed contracts
#[derive(Clone)]
pub struct Deployment {
    /// The token
    pub token: TokenContract,
    /// The event contract
    pub event_contract: EventContract,
}

/// Deploys the token (initial supply minted to `deployer`) and the event
/// contract that escrows it
///
/// # Errors
///
/// [`DeployError::Ledger`] if either deployment reverts.
pub async fn deploy_contracts(ledger: &Ledger, deployer: Address) -> Result<Deployment, DeployError> {
    let params = TokenParams {
        name: TOKEN_NAME.to_string(),
        symbol: TOKEN_SYMBOL.to_string(),
        decimals: TOKEN_DECIMALS,
        initial_supply: parse_units(INITIAL_SUPPLY, TOKEN_DECIMALS)?,
        owner: deployer,
    };

    let token = ledger.deploy_token(deployer, params).await?;
    tracing::info!(address = %token.address(), "MyToken deployed");

    let event_contract = ledger
        .deploy_event_contract(deployer, token.address())
        .await?;
    tracing::info!(address = %event_contract.address(), "EventContract deployed");

    Ok(Deployment {
        token,
        event_contract,
    })
}
