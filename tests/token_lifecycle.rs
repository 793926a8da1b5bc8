//! Integration tests for the full register → initialize → mint lifecycle

use modtoken::backend::basic::{
    initialize_mint_payload, BasicTokenBackend, Mint, TokenAccount,
};
use modtoken::config::LedgerConfig;
use modtoken::crypto::{address_from_string, Address, KeyPair};
use modtoken::error::LedgerError;
use modtoken::frontend::core::{
    initialize_mint_op, initialize_token_account_op, mint_address, mint_to_op,
    register_backend_op, token_account_address, TokenFrontend,
};
use modtoken::frontend::registry::BackendRegistration;
use modtoken::runtime::account::ModuleId;
use modtoken::runtime::ledger::{Ledger, Transaction};
use std::sync::Arc;

const TOKEN_ACCOUNT_SIZE: u32 = 48;
const MINT_SIZE: u32 = 49;

struct Harness {
    ledger: Ledger,
    frontend: ModuleId,
    backend: ModuleId,
}

/// Wire up a ledger with the frontend and one reference backend installed.
fn setup() -> Result<Harness, Box<dyn std::error::Error>> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let frontend = address_from_string("token-frontend");
    let backend = address_from_string("basic-token-backend");

    let mut ledger = Ledger::new();
    ledger.install_module(Arc::new(TokenFrontend::new(frontend)))?;
    ledger.install_module(Arc::new(BasicTokenBackend::new(backend)))?;

    Ok(Harness {
        ledger,
        frontend,
        backend,
    })
}

fn register(h: &Harness) -> Result<(), LedgerError> {
    let op = register_backend_op(&h.frontend, &h.backend, TOKEN_ACCOUNT_SIZE, MINT_SIZE)?;
    h.ledger.submit(&Transaction::new(vec![op])).map(|_| ())
}

fn init_mint(h: &Harness, nonce: u64, authority: &Address, decimals: u8) -> Result<(), LedgerError> {
    let payload = initialize_mint_payload(authority, decimals);
    let op = initialize_mint_op(&h.frontend, &h.backend, nonce, payload)?;
    h.ledger.submit(&Transaction::new(vec![op])).map(|_| ())
}

fn init_token_account(h: &Harness, owner: &Address, nonce: u64) -> Result<(), LedgerError> {
    let op = initialize_token_account_op(&h.frontend, &h.backend, owner, nonce, Vec::new())?;
    h.ledger.submit(&Transaction::new(vec![op])).map(|_| ())
}

fn mint_to(
    h: &Harness,
    owner: &Address,
    nonce: u64,
    amount: u64,
    authority: &KeyPair,
) -> Result<(), LedgerError> {
    let op = mint_to_op(
        &h.frontend,
        &h.backend,
        owner,
        nonce,
        amount,
        &authority.address(),
    )?;
    let mut tx = Transaction::new(vec![op]);
    tx.sign(authority)?;
    h.ledger.submit(&tx).map(|_| ())
}

fn read_mint(h: &Harness, nonce: u64) -> Result<Mint, LedgerError> {
    let address = mint_address(&h.frontend, nonce)?.address;
    Mint::unpack(&h.ledger.account_data(&address)?)
}

fn read_token_account(h: &Harness, owner: &Address, nonce: u64) -> Result<TokenAccount, LedgerError> {
    let address = token_account_address(&h.frontend, nonce, owner)?.address;
    TokenAccount::unpack(&h.ledger.account_data(&address)?)
}

#[test]
fn test_end_to_end_lifecycle() -> Result<(), Box<dyn std::error::Error>> {
    let h = setup()?;
    let authority = KeyPair::generate()?;
    let owner = address_from_string("owner-o");
    let nonce = 4u64;

    register(&h)?;
    init_mint(&h, nonce, &authority.address(), 6)?;
    init_token_account(&h, &owner, nonce)?;

    let token = read_token_account(&h, &owner, nonce)?;
    assert_eq!(token.balance, 0);
    assert_eq!(token.owner, owner);

    let mint = read_mint(&h, nonce)?;
    assert_eq!(mint.supply, 0);
    assert_eq!(mint.decimals, 6);
    assert_eq!(mint.mint_authority, authority.address());

    mint_to(&h, &owner, nonce, 1000, &authority)?;

    let token = read_token_account(&h, &owner, nonce)?;
    let mint = read_mint(&h, nonce)?;
    assert_eq!(token.balance, 1000);
    assert_eq!(mint.supply, 1000);

    Ok(())
}

#[test]
fn test_registration_is_write_once() -> Result<(), Box<dyn std::error::Error>> {
    let h = setup()?;
    register(&h)?;

    let second = register_backend_op(&h.frontend, &h.backend, 100, 100)?;
    let result = h.ledger.submit(&Transaction::new(vec![second]));
    assert!(matches!(result, Err(LedgerError::AlreadyRegistered)));

    // The first registration's stored sizes are unchanged.
    let derived = BackendRegistration::derive(&h.frontend, &h.backend)?;
    let record = BackendRegistration::unpack(&h.ledger.account_data(&derived.address)?)?;
    assert_eq!(record.token_account_size, TOKEN_ACCOUNT_SIZE);
    assert_eq!(record.mint_size, MINT_SIZE);

    Ok(())
}

#[test]
fn test_registration_requires_installed_backend() -> Result<(), Box<dyn std::error::Error>> {
    let h = setup()?;
    let ghost = address_from_string("uninstalled-backend");

    let op = register_backend_op(&h.frontend, &ghost, TOKEN_ACCOUNT_SIZE, MINT_SIZE)?;
    let result = h.ledger.submit(&Transaction::new(vec![op]));
    assert!(matches!(result, Err(LedgerError::UnknownModule(_))));

    Ok(())
}

#[test]
fn test_initialize_mint_requires_registration() -> Result<(), Box<dyn std::error::Error>> {
    let h = setup()?;
    let authority = KeyPair::generate()?;

    let result = init_mint(&h, 1, &authority.address(), 6);
    assert!(matches!(result, Err(LedgerError::BackendNotRegistered(_))));

    Ok(())
}

#[test]
fn test_reinitialize_mint_is_forbidden() -> Result<(), Box<dyn std::error::Error>> {
    let h = setup()?;
    let first_authority = KeyPair::generate()?;
    let second_authority = KeyPair::generate()?;

    register(&h)?;
    init_mint(&h, 7, &first_authority.address(), 6)?;

    let result = init_mint(&h, 7, &second_authority.address(), 9);
    assert!(matches!(result, Err(LedgerError::AlreadyInitialized)));

    // The first initialization's effects are untouched.
    let mint = read_mint(&h, 7)?;
    assert_eq!(mint.mint_authority, first_authority.address());
    assert_eq!(mint.decimals, 6);

    Ok(())
}

#[test]
fn test_reinitialize_token_account_is_forbidden() -> Result<(), Box<dyn std::error::Error>> {
    let h = setup()?;
    let authority = KeyPair::generate()?;
    let owner = address_from_string("owner-o");

    register(&h)?;
    init_mint(&h, 2, &authority.address(), 0)?;
    init_token_account(&h, &owner, 2)?;

    let result = init_token_account(&h, &owner, 2);
    assert!(matches!(result, Err(LedgerError::AlreadyInitialized)));

    Ok(())
}

#[test]
fn test_token_account_requires_existing_mint() -> Result<(), Box<dyn std::error::Error>> {
    let h = setup()?;
    let owner = address_from_string("owner-o");

    register(&h)?;
    let result = init_token_account(&h, &owner, 3);
    assert!(matches!(result, Err(LedgerError::MintNotFound(_))));

    Ok(())
}

#[test]
fn test_mint_to_rejects_wrong_authority() -> Result<(), Box<dyn std::error::Error>> {
    let h = setup()?;
    let authority = KeyPair::generate()?;
    let impostor = KeyPair::generate()?;
    let owner = address_from_string("owner-o");

    register(&h)?;
    init_mint(&h, 4, &authority.address(), 6)?;
    init_token_account(&h, &owner, 4)?;

    let result = mint_to(&h, &owner, 4, 1000, &impostor);
    assert!(matches!(result, Err(LedgerError::Unauthorized)));

    // Balance and supply are unchanged.
    assert_eq!(read_token_account(&h, &owner, 4)?.balance, 0);
    assert_eq!(read_mint(&h, 4)?.supply, 0);

    Ok(())
}

#[test]
fn test_mint_to_requires_signature() -> Result<(), Box<dyn std::error::Error>> {
    let h = setup()?;
    let authority = KeyPair::generate()?;
    let owner = address_from_string("owner-o");

    register(&h)?;
    init_mint(&h, 5, &authority.address(), 6)?;
    init_token_account(&h, &owner, 5)?;

    // Declares the authority as signer but carries no signature at all.
    let op = mint_to_op(&h.frontend, &h.backend, &owner, 5, 1000, &authority.address())?;
    let result = h.ledger.submit(&Transaction::new(vec![op]));
    assert!(matches!(result, Err(LedgerError::Unauthorized)));

    assert_eq!(read_token_account(&h, &owner, 5)?.balance, 0);

    Ok(())
}

#[test]
fn test_mint_to_accumulates_supply_and_balance() -> Result<(), Box<dyn std::error::Error>> {
    let h = setup()?;
    let authority = KeyPair::generate()?;
    let owner = address_from_string("owner-o");

    register(&h)?;
    init_mint(&h, 6, &authority.address(), 6)?;
    init_token_account(&h, &owner, 6)?;

    mint_to(&h, &owner, 6, 400, &authority)?;
    mint_to(&h, &owner, 6, 600, &authority)?;

    assert_eq!(read_token_account(&h, &owner, 6)?.balance, 1000);
    assert_eq!(read_mint(&h, 6)?.supply, 1000);

    Ok(())
}

#[test]
fn test_mint_to_overflow_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let h = setup()?;
    let authority = KeyPair::generate()?;
    let owner = address_from_string("owner-o");

    register(&h)?;
    init_mint(&h, 8, &authority.address(), 0)?;
    init_token_account(&h, &owner, 8)?;

    mint_to(&h, &owner, 8, u64::MAX, &authority)?;
    let result = mint_to(&h, &owner, 8, 1, &authority);
    assert!(matches!(result, Err(LedgerError::ArithmeticOverflow)));

    // The failed transaction left both counters at their previous values.
    assert_eq!(read_token_account(&h, &owner, 8)?.balance, u64::MAX);
    assert_eq!(read_mint(&h, 8)?.supply, u64::MAX);

    Ok(())
}

#[test]
fn test_size_mismatch_surfaces_from_backend() -> Result<(), Box<dyn std::error::Error>> {
    let mut h = setup()?;
    let misregistered = address_from_string("misregistered-backend");
    h.ledger
        .install_module(Arc::new(BasicTokenBackend::new(misregistered)))?;

    // Record sizes the backend's layouts do not match.
    let op = register_backend_op(&h.frontend, &misregistered, 40, 40)?;
    h.ledger.submit(&Transaction::new(vec![op]))?;

    let authority = KeyPair::generate()?;
    let payload = initialize_mint_payload(&authority.address(), 6);
    let op = initialize_mint_op(&h.frontend, &misregistered, 9, payload)?;
    let result = h.ledger.submit(&Transaction::new(vec![op]));
    assert!(matches!(result, Err(LedgerError::SizeMismatch(_))));

    // The whole transaction rolled back; no mint account was left behind.
    let mint = mint_address(&h.frontend, 9)?;
    assert!(!h.ledger.account_exists(&mint.address));

    Ok(())
}

#[test]
fn test_backend_failure_rolls_back_account_creation() -> Result<(), Box<dyn std::error::Error>> {
    let h = setup()?;

    register(&h)?;

    // Malformed backend payload: the frontend creates the mint account first,
    // then the delegation fails and the creation must be rolled back.
    let op = initialize_mint_op(&h.frontend, &h.backend, 10, vec![1, 2, 3])?;
    let result = h.ledger.submit(&Transaction::new(vec![op]));
    assert!(matches!(result, Err(LedgerError::BackendRejected(_))));

    let mint = mint_address(&h.frontend, 10)?;
    assert!(!h.ledger.account_exists(&mint.address));

    Ok(())
}

#[test]
fn test_two_backends_coexist() -> Result<(), Box<dyn std::error::Error>> {
    let mut h = setup()?;
    let second = address_from_string("second-backend");
    h.ledger
        .install_module(Arc::new(BasicTokenBackend::new(second)))?;
    assert!(h.ledger.module_installed(&second));

    register(&h)?;
    let op = register_backend_op(&h.frontend, &second, TOKEN_ACCOUNT_SIZE, MINT_SIZE)?;
    h.ledger.submit(&Transaction::new(vec![op]))?;

    let authority = KeyPair::generate()?;
    init_mint(&h, 11, &authority.address(), 6)?;

    let payload = initialize_mint_payload(&authority.address(), 2);
    let op = initialize_mint_op(&h.frontend, &second, 12, payload)?;
    h.ledger.submit(&Transaction::new(vec![op]))?;

    assert_eq!(read_mint(&h, 11)?.decimals, 6);
    assert_eq!(read_mint(&h, 12)?.decimals, 2);

    Ok(())
}

#[test]
fn test_configured_account_size_limit_is_enforced() -> Result<(), Box<dyn std::error::Error>> {
    let frontend = address_from_string("token-frontend");
    let backend = address_from_string("basic-token-backend");

    let mut ledger = Ledger::with_config(LedgerConfig {
        max_account_size: 10,
        ..Default::default()
    });
    ledger.install_module(Arc::new(TokenFrontend::new(frontend)))?;
    ledger.install_module(Arc::new(BasicTokenBackend::new(backend)))?;

    // The 48-byte registration record exceeds the configured limit.
    let op = register_backend_op(&frontend, &backend, TOKEN_ACCOUNT_SIZE, MINT_SIZE)?;
    let result = ledger.submit(&Transaction::new(vec![op]));
    assert!(matches!(result, Err(LedgerError::InvalidInstruction(_))));

    Ok(())
}

#[test]
fn test_mint_addresses_are_stable_and_distinct() -> Result<(), Box<dyn std::error::Error>> {
    let h = setup()?;

    let a1 = mint_address(&h.frontend, 1)?;
    let a2 = mint_address(&h.frontend, 1)?;
    let b = mint_address(&h.frontend, 2)?;

    assert_eq!(a1, a2);
    assert_ne!(a1.address, b.address);

    Ok(())
}
