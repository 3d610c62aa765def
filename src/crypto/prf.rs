use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha384};
use zeroize::Zeroizing;

use crate::message::{CipherSuite, HashAlgorithm};
use crate::Error;

const MASTER_SECRET_LEN: usize = 48;

/// PRF for TLS 1.2
/// as specified in RFC 5246 Section 5.
///
/// PRF(secret, label, seed) = P_<hash>(secret, label + seed)
///
/// The seed is passed WITHOUT the label.
pub fn prf_tls12(
    secret: &[u8],
    label: &str,
    seed: &[u8],
    output_len: usize,
    hash: HashAlgorithm,
) -> Result<Zeroizing<Vec<u8>>, Error> {
    let mut full_seed = Vec::with_capacity(label.len() + seed.len());
    full_seed.extend_from_slice(label.as_bytes());
    full_seed.extend_from_slice(seed);

    match hash {
        HashAlgorithm::SHA256 => p_hash::<Hmac<Sha256>>(secret, &full_seed, output_len),
        HashAlgorithm::SHA384 => p_hash::<Hmac<Sha384>>(secret, &full_seed, output_len),
        _ => Err(Error::CryptoError(format!(
            "Unsupported PRF hash for TLS1.2: {:?}",
            hash
        ))),
    }
}

fn p_hash<M: Mac + hmac::digest::KeyInit + Clone>(
    secret: &[u8],
    full_seed: &[u8],
    output_len: usize,
) -> Result<Zeroizing<Vec<u8>>, Error> {
    let key = <M as hmac::digest::KeyInit>::new_from_slice(secret)
        .map_err(|_| Error::CryptoError("Invalid HMAC key".into()))?;

    let mut result = Zeroizing::new(Vec::with_capacity(output_len));

    // A(1) = HMAC_hash(secret, A(0)) where A(0) = seed
    let mut mac = key.clone();
    mac.update(full_seed);
    let mut a = mac.finalize().into_bytes();

    while result.len() < output_len {
        // HMAC_hash(secret, A(i) + seed)
        let mut mac = key.clone();
        mac.update(&a);
        mac.update(full_seed);
        let output = mac.finalize().into_bytes();

        let remaining = output_len - result.len();
        let to_copy = remaining.min(output.len());
        result.extend_from_slice(&output[..to_copy]);

        // A(i+1) = HMAC_hash(secret, A(i))
        let mut mac = key.clone();
        mac.update(&a);
        a = mac.finalize().into_bytes();
    }

    Ok(result)
}

/// master_secret = PRF(pre_master_secret, "master secret", client_random + server_random, 48)
pub fn master_secret(
    pre_master_secret: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
    hash: HashAlgorithm,
) -> Result<Zeroizing<Vec<u8>>, Error> {
    let mut seed = [0u8; 64];
    seed[..32].copy_from_slice(client_random);
    seed[32..].copy_from_slice(server_random);
    prf_tls12(pre_master_secret, "master secret", &seed, MASTER_SECRET_LEN, hash)
}

/// Key expansion for TLS 1.2
/// as specified in RFC 5246 Section 6.3
pub fn key_expansion(
    master_secret: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
    key_material_length: usize,
    hash: HashAlgorithm,
) -> Result<Zeroizing<Vec<u8>>, Error> {
    // For key expansion, the seed is server_random + client_random
    let mut seed = [0u8; 64];
    seed[..32].copy_from_slice(server_random);
    seed[32..].copy_from_slice(client_random);
    prf_tls12(master_secret, "key expansion", &seed, key_material_length, hash)
}

/// Hash of the handshake transcript with the suite's PRF hash.
pub fn transcript_hash(hash: HashAlgorithm, transcript: &[u8]) -> Vec<u8> {
    match hash {
        HashAlgorithm::SHA384 => Sha384::digest(transcript).to_vec(),
        _ => Sha256::digest(transcript).to_vec(),
    }
}

/// verify_data = PRF(master_secret, finished_label, Hash(handshake_messages))
pub fn verify_data(
    suite: CipherSuite,
    master_secret: &[u8],
    client: bool,
    transcript: &[u8],
) -> Result<Vec<u8>, Error> {
    let hash = suite.hash_algorithm();
    let label = if client {
        "client finished"
    } else {
        "server finished"
    };
    let digest = transcript_hash(hash, transcript);
    let out = prf_tls12(
        master_secret,
        label,
        &digest,
        suite.verify_data_length(),
        hash,
    )?;
    Ok(out.to_vec())
}

/// HMAC-SHA256, used for stateless cookies.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<[u8; 32], Error> {
    let mut mac = <Hmac<Sha256> as hmac::digest::KeyInit>::new_from_slice(key)
        .map_err(|_| Error::CryptoError("Invalid HMAC key".into()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().into())
}
