//! Secure-boot enrollment and signed updates through the variable store

mod common;

use common::{
    at, sha256_list, store, unsigned_update, x509_list, Identity, MemStore, SignStyle, Signer,
    Update,
};
use octeon_efivar::{
    AuthError, MemoryStorage, SecureBootMode, StoreConfig, VarAttributes, VarError, VarName,
    VariableStore, EFI_GLOBAL_VARIABLE, EFI_IMAGE_SECURITY_DATABASE,
};

const AUTH: VarAttributes = VarAttributes::AUTHENTICATED_NV_BS_RT;

fn pk_update<'a>(day: u8, payload: &'a [u8]) -> Update<'a> {
    Update {
        name: "PK",
        vendor: EFI_GLOBAL_VARIABLE,
        attributes: AUTH,
        time: at(day),
        payload,
    }
}

fn kek_update<'a>(day: u8, payload: &'a [u8]) -> Update<'a> {
    Update {
        name: "KEK",
        ..pk_update(day, payload)
    }
}

fn db_update<'a>(day: u8, payload: &'a [u8]) -> Update<'a> {
    Update {
        name: "db",
        vendor: EFI_IMAGE_SECURITY_DATABASE,
        ..pk_update(day, payload)
    }
}

fn global_byte(store: &MemStore, name: &str) -> u8 {
    store.get(&VarName::from(name), &EFI_GLOBAL_VARIABLE).unwrap().data[0]
}

/// Store in user mode with `pk` enrolled on day 1.
fn enrolled(pk: &Identity) -> MemStore {
    let mut store = store();
    let list = x509_list(&[&pk.cert]);
    let update = pk_update(1, &list);
    update
        .apply(&mut store, &unsigned_update(update.time, &list))
        .unwrap();
    assert_eq!(store.secure_boot_mode(), SecureBootMode::User);
    store
}

#[test]
fn test_setup_mode_accepts_unsigned_pk() {
    let mut store = store();
    assert_eq!(global_byte(&store, "SetupMode"), 1);
    assert_eq!(global_byte(&store, "SecureBoot"), 0);

    let pk = Identity::self_signed("Platform Key", 1, Signer::ed25519(1));
    let list = x509_list(&[&pk.cert]);
    pk_update(1, &list)
        .apply(&mut store, &unsigned_update(at(1), &list))
        .unwrap();

    assert_eq!(store.secure_boot_mode(), SecureBootMode::User);
    assert_eq!(global_byte(&store, "SetupMode"), 0);
    assert_eq!(global_byte(&store, "SecureBoot"), 1);
    assert_eq!(global_byte(&store, "AuditMode"), 0);
    assert_eq!(global_byte(&store, "DeployedMode"), 0);

    let entry = store.get(&VarName::from("PK"), &EFI_GLOBAL_VARIABLE).unwrap();
    assert_eq!(entry.data, list);
    assert_eq!(entry.time, at(1).unix_seconds());
    assert_eq!(entry.attributes, AUTH);
}

#[test]
fn test_kek_signed_by_pk() {
    let pk = Identity::self_signed("Platform Key", 1, Signer::ed25519(1));
    let kek = Identity::self_signed("KEK", 2, Signer::ed25519(2));
    let mut store = enrolled(&pk);

    let list = x509_list(&[&kek.cert]);
    let update = kek_update(2, &list);
    let env = update.signed(&pk, &[], SignStyle::default());
    update.apply(&mut store, &env).unwrap();

    let entry = store.get(&VarName::from("KEK"), &EFI_GLOBAL_VARIABLE).unwrap();
    assert_eq!(entry.data, list);
    assert_eq!(entry.time, at(2).unix_seconds());
    assert!(store.storage().image().is_some());
}

#[test]
fn test_unsigned_kek_rejected_in_user_mode() {
    let pk = Identity::self_signed("Platform Key", 1, Signer::ed25519(1));
    let mut store = enrolled(&pk);

    let update = kek_update(2, b"kek");
    let res = update.apply(&mut store, &unsigned_update(at(2), b"kek"));
    assert_eq!(res, Err(VarError::SecurityViolation(AuthError::Malformed)));
    assert!(store.get(&VarName::from("KEK"), &EFI_GLOBAL_VARIABLE).is_none());
}

#[test]
fn test_db_signed_by_kek_and_pk_fallback() {
    let pk = Identity::self_signed("Platform Key", 1, Signer::ed25519(1));
    let kek = Identity::self_signed("KEK", 2, Signer::ed25519(2));
    let mut store = enrolled(&pk);

    let kek_list = x509_list(&[&kek.cert]);
    let update = kek_update(2, &kek_list);
    update
        .apply(&mut store, &update.signed(&pk, &[], SignStyle::default()))
        .unwrap();

    let hashes = sha256_list(&[[0x11; 32]]);
    let update = db_update(3, &hashes);
    update
        .apply(&mut store, &update.signed(&kek, &[], SignStyle::default()))
        .unwrap();

    // PK also signs db when KEK does not verify.
    let hashes = sha256_list(&[[0x22; 32]]);
    let update = db_update(4, &hashes);
    update
        .apply(&mut store, &update.signed(&pk, &[], SignStyle::default()))
        .unwrap();
    let db = store.get(&VarName::from("db"), &EFI_IMAGE_SECURITY_DATABASE).unwrap();
    assert_eq!(db.data, hashes);
}

#[test]
fn test_stale_update_rejected() {
    let pk = Identity::self_signed("Platform Key", 1, Signer::ed25519(1));
    let mut store = enrolled(&pk);

    let first = x509_list(&[&pk.cert]);
    let update = kek_update(5, &first);
    update
        .apply(&mut store, &update.signed(&pk, &[], SignStyle::default()))
        .unwrap();

    for day in [5, 4] {
        let update = kek_update(day, b"replay");
        let res = update.apply(&mut store, &update.signed(&pk, &[], SignStyle::default()));
        assert_eq!(res, Err(VarError::SecurityViolation(AuthError::Stale)));
    }
    let kek = store.get(&VarName::from("KEK"), &EFI_GLOBAL_VARIABLE).unwrap();
    assert_eq!(kek.data, first);
}

#[test]
fn test_wrong_key_rejected() {
    let pk = Identity::self_signed("Platform Key", 1, Signer::ed25519(1));
    let rogue = Identity::self_signed("Platform Key", 1, Signer::ed25519(9));
    let mut store = enrolled(&pk);

    let update = kek_update(2, b"kek");
    let res = update.apply(&mut store, &update.signed(&rogue, &[], SignStyle::default()));
    assert_eq!(res, Err(VarError::SecurityViolation(AuthError::VerificationFailed)));
}

#[test]
fn test_tampered_payload_rejected() {
    let pk = Identity::self_signed("Platform Key", 1, Signer::ed25519(1));
    let mut store = enrolled(&pk);

    let update = kek_update(2, b"kek-list");
    let mut env = update.signed(&pk, &[], SignStyle::default());
    let last = env.len() - 1;
    env[last] ^= 0xff;
    let res = update.apply(&mut store, &env);
    assert_eq!(res, Err(VarError::SecurityViolation(AuthError::VerificationFailed)));
}

#[test]
fn test_signature_covers_name_and_attributes() {
    let pk = Identity::self_signed("Platform Key", 1, Signer::ed25519(1));
    let mut store = enrolled(&pk);

    // Signed for db, presented as KEK.
    let signed_for = db_update(2, b"list");
    let env = signed_for.signed(&pk, &[], SignStyle::default());
    let res = kek_update(2, b"list").apply(&mut store, &env);
    assert_eq!(res, Err(VarError::SecurityViolation(AuthError::VerificationFailed)));
}

#[test]
fn test_chain_through_embedded_intermediate() {
    let root = Identity::self_signed("Root", 1, Signer::ed25519(1));
    let intermediate = Identity::issued_by("Intermediate", 2, Signer::ed25519(2), &root);
    let leaf = Identity::issued_by("Signer", 3, Signer::ed25519(3), &intermediate);
    let mut store = enrolled(&root);

    let update = kek_update(2, b"kek");
    let env = update.signed(&leaf, &[&leaf.cert, &intermediate.cert], SignStyle::default());
    update.apply(&mut store, &env).unwrap();

    // Without the intermediate there is no path to the root.
    let update = kek_update(3, b"kek2");
    let env = update.signed(&leaf, &[&leaf.cert], SignStyle::default());
    assert_eq!(
        update.apply(&mut store, &env),
        Err(VarError::SecurityViolation(AuthError::VerificationFailed))
    );
}

#[test]
fn test_signed_attributes() {
    let pk = Identity::self_signed("Platform Key", 1, Signer::ed25519(1));
    let mut store = enrolled(&pk);

    let style = SignStyle {
        signed_attrs: true,
        content_info: false,
    };
    let update = kek_update(2, b"kek");
    update.apply(&mut store, &update.signed(&pk, &[], style)).unwrap();
}

#[test]
fn test_rsa_content_info_with_attributes() {
    let pk = Identity::self_signed("Platform Key", 7, Signer::rsa());
    let mut store = enrolled(&pk);

    let style = SignStyle {
        signed_attrs: true,
        content_info: true,
    };
    let list = x509_list(&[&pk.cert]);
    let update = kek_update(2, &list);
    update
        .apply(&mut store, &update.signed(&pk, &[&pk.cert], style))
        .unwrap();

    let update = kek_update(3, &list);
    update
        .apply(&mut store, &update.signed(&pk, &[], SignStyle::default()))
        .unwrap();
}

#[test]
fn test_append_to_db() {
    let pk = Identity::self_signed("Platform Key", 1, Signer::ed25519(1));
    let mut store = enrolled(&pk);

    let first = sha256_list(&[[0x11; 32]]);
    let update = db_update(2, &first);
    update
        .apply(&mut store, &update.signed(&pk, &[], SignStyle::default()))
        .unwrap();

    let second = sha256_list(&[[0x22; 32]]);
    let update = Update {
        attributes: AUTH | VarAttributes::APPEND_WRITE,
        ..db_update(3, &second)
    };
    update
        .apply(&mut store, &update.signed(&pk, &[], SignStyle::default()))
        .unwrap();

    let db = store.get(&VarName::from("db"), &EFI_IMAGE_SECURITY_DATABASE).unwrap();
    assert_eq!(db.data, [first, second].concat());
    assert_eq!(db.attributes, AUTH);
    assert_eq!(db.time, at(3).unix_seconds());
}

#[test]
fn test_signed_empty_payload_deletes_pk() {
    let pk = Identity::self_signed("Platform Key", 1, Signer::ed25519(1));
    let mut store = enrolled(&pk);

    let update = pk_update(2, b"");
    update
        .apply(&mut store, &update.signed(&pk, &[], SignStyle::default()))
        .unwrap();

    assert!(store.get(&VarName::from("PK"), &EFI_GLOBAL_VARIABLE).is_none());
    assert_eq!(store.secure_boot_mode(), SecureBootMode::Setup);
    assert_eq!(global_byte(&store, "SetupMode"), 1);
    assert_eq!(global_byte(&store, "SecureBoot"), 0);
}

#[test]
fn test_corrupt_pk_is_no_trust_store() {
    let mut store = store();
    let update = pk_update(1, b"not a signature list");
    update
        .apply(&mut store, &unsigned_update(at(1), b"not a signature list"))
        .unwrap();
    assert_eq!(store.secure_boot_mode(), SecureBootMode::User);

    let signer = Identity::self_signed("Anyone", 1, Signer::ed25519(4));
    let update = kek_update(2, b"kek");
    let res = update.apply(&mut store, &update.signed(&signer, &[], SignStyle::default()));
    assert_eq!(res, Err(VarError::SecurityViolation(AuthError::NoTrustStore)));
}

#[test]
fn test_protected_variables_need_time_auth() {
    let mut store = store();
    let pk = VarName::from("PK");
    let res = store.set_variable(&pk, &EFI_GLOBAL_VARIABLE, VarAttributes::NV_BS_RT.bits(), b"x");
    assert_eq!(res, Err(VarError::InvalidParameter));

    let legacy = VarAttributes::NV_BS_RT | VarAttributes::AUTHENTICATED_WRITE_ACCESS;
    let res = store.set_variable(&VarName::from("Other"), &EFI_GLOBAL_VARIABLE, legacy.bits(), b"x");
    assert_eq!(res, Err(VarError::InvalidParameter));
}

#[test]
fn test_secure_boot_unsupported() {
    let config = StoreConfig::new().with_secure_boot(false);
    let mut store = VariableStore::init(config, MemoryStorage::new()).unwrap();
    assert!(store.get(&VarName::from("SecureBoot"), &EFI_GLOBAL_VARIABLE).is_none());

    let update = pk_update(1, b"pk");
    let res = update.apply(&mut store, &unsigned_update(at(1), b"pk"));
    assert_eq!(res, Err(VarError::InvalidParameter));
    assert_eq!(store.secure_boot_mode(), SecureBootMode::Setup);
}

#[test]
fn test_enrollment_survives_reboot() {
    let pk = Identity::self_signed("Platform Key", 1, Signer::ed25519(1));
    let store = enrolled(&pk);
    let image = store.storage().image().unwrap().to_vec();

    let rebooted = VariableStore::init(StoreConfig::new(), MemoryStorage::with_image(image)).unwrap();
    assert_eq!(rebooted.secure_boot_mode(), SecureBootMode::User);
    let entry = rebooted.get(&VarName::from("PK"), &EFI_GLOBAL_VARIABLE).unwrap();
    assert_eq!(entry.time, at(1).unix_seconds());
    // State variables are volatile and recomputed.
    assert_eq!(global_byte(&rebooted, "SecureBoot"), 1);
}
