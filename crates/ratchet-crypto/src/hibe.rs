//! Hierarchical identity-based encryption (Boneh-Boyen-Goh) over BLS12-381
//!
//! Keys live at a path of identities. A key can derive keys for any child
//! path but never for its ancestors, which is what lets ku-KEM secret keys
//! move forward irreversibly.
//!
//! Ciphertexts have a constant size regardless of the path length:
//!
//! ```text
//! B = g^s                         (G1, 48 bytes)
//! C = (H_1^I_1 ... H_k^I_k G3)^s  (G1, 48 bytes)
//! k = H(e(g1, g2)^s)              -> XChaCha20-Poly1305 over the message
//! ```
//!
//! Keys live in G2 so that decryption is two pairings:
//! `e(B, d0) / e(C, d1) = e(g1, g2)^s`.
//!
//! Secret key components are kept compressed inside [`Secret`] so that
//! erasing an [`EntityKey`] zeroizes them.

use std::fmt;

use bls12_381::{G1Affine, G1Projective, G2Affine, G2Projective, Gt, Scalar, pairing};
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    aead::{Authenticated, XChaCha},
    env::Environment,
    error::CryptoError,
    hash::{hash, hash_wide},
    secret::Secret,
};

const G1_SIZE: usize = 48;
const G2_SIZE: usize = 96;

/// One component of an identity path, reduced to a scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity([u8; 32]);

impl Identity {
    /// Hash arbitrary bytes onto an identity.
    pub fn hash(bytes: &[u8]) -> Self {
        let wide = hash_wide(b"ratchet hibe identity", &[bytes]);
        Self(Scalar::from_bytes_wide(&wide).to_bytes())
    }

    /// Canonical scalar encoding.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn scalar(&self) -> Result<Scalar, CryptoError> {
        Option::from(Scalar::from_bytes(&self.0)).ok_or(CryptoError::Malformed { what: "identity" })
    }
}

/// Public parameters for a hierarchy of fixed depth.
#[derive(Clone, PartialEq, Eq)]
pub struct HibeParams {
    g1: G1Affine,
    g2: G2Affine,
    g3: G1Affine,
    g3_hat: G2Affine,
    h: Vec<G1Affine>,
    h_hat: Vec<G2Affine>,
}

impl fmt::Debug for HibeParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HibeParams").field("depth", &self.depth()).finish_non_exhaustive()
    }
}

impl HibeParams {
    /// Maximum path length.
    pub fn depth(&self) -> usize {
        self.h.len()
    }

    /// Fixed encoding: `g1 || g2 || g3 || g3_hat || (h_i || h_hat_i)*`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 * (G1_SIZE + G2_SIZE) * (1 + self.depth()));
        out.extend_from_slice(&self.g1.to_compressed());
        out.extend_from_slice(&self.g2.to_compressed());
        out.extend_from_slice(&self.g3.to_compressed());
        out.extend_from_slice(&self.g3_hat.to_compressed());
        for (h, h_hat) in self.h.iter().zip(&self.h_hat) {
            out.extend_from_slice(&h.to_compressed());
            out.extend_from_slice(&h_hat.to_compressed());
        }
        out
    }

    /// Parse the fixed encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        const MALFORMED: CryptoError = CryptoError::Malformed { what: "hibe parameters" };
        let level = G1_SIZE + G2_SIZE;
        if bytes.len() < 2 * level || bytes.len() % level != 0 {
            return Err(MALFORMED);
        }

        let mut chunks = bytes.chunks_exact(level);
        let mut pairs = Vec::with_capacity(bytes.len() / level);
        for chunk in &mut chunks {
            let (a, b) = chunk.split_at(G1_SIZE);
            pairs.push((g1_from_bytes(a)?, g2_from_bytes(b)?));
        }

        // First chunk holds (g1, g2), second (g3, g3_hat), the rest one level each.
        let mut pairs = pairs.into_iter();
        let (g1, g2) = pairs.next().ok_or(MALFORMED)?;
        let (g3, g3_hat) = pairs.next().ok_or(MALFORMED)?;
        let (h, h_hat) = pairs.unzip();

        Ok(Self { g1, g2, g3, g3_hat, h, h_hat })
    }

    fn q(&self, path: &[Scalar]) -> G1Projective {
        path.iter()
            .zip(&self.h)
            .fold(G1Projective::from(self.g3), |acc, (id, h)| acc + G1Projective::from(h) * id)
    }

    fn q_hat(&self, path: &[Scalar]) -> G2Projective {
        path.iter()
            .zip(&self.h_hat)
            .fold(G2Projective::from(self.g3_hat), |acc, (id, h)| acc + G2Projective::from(h) * id)
    }
}

impl Serialize for HibeParams {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ByteBuf::from(self.to_bytes()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for HibeParams {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = ByteBuf::deserialize(deserializer)?;
        Self::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

/// Secret key for one path in the hierarchy.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct EntityKey {
    #[zeroize(skip)]
    path: Vec<Identity>,
    d0: Secret<G2_SIZE>,
    d1: Secret<G2_SIZE>,
    b: Vec<Secret<G2_SIZE>>,
}

impl fmt::Debug for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityKey").field("level", &self.path.len()).finish_non_exhaustive()
    }
}

impl EntityKey {
    /// Identity path this key decrypts for.
    pub fn path(&self) -> &[Identity] {
        &self.path
    }

    fn from_points(path: Vec<Identity>, d0: G2Projective, d1: G2Projective, b: &[G2Projective]) -> Self {
        Self {
            path,
            d0: Secret::from_bytes(G2Affine::from(d0).to_compressed()),
            d1: Secret::from_bytes(G2Affine::from(d1).to_compressed()),
            b: b.iter().map(|p| Secret::from_bytes(G2Affine::from(p).to_compressed())).collect(),
        }
    }
}

/// Pairing header of a ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HibeHeader {
    #[serde(with = "serde_bytes")]
    b: [u8; G1_SIZE],
    #[serde(with = "serde_bytes")]
    c: [u8; G1_SIZE],
}

/// HIBE ciphertext: pairing header plus AEAD body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HibeCiphertext {
    /// Key-encapsulation header
    pub c1: HibeHeader,
    /// AEAD-encrypted message
    #[serde(with = "serde_bytes")]
    pub c2: Vec<u8>,
}

impl HibeCiphertext {
    /// Fixed encoding `B || C || c2`, for binding into signatures.
    pub fn to_bytes(&self) -> Vec<u8> {
        header_ad(&self.c1, &self.c2)
    }
}

fn g1_from_bytes(bytes: &[u8]) -> Result<G1Affine, CryptoError> {
    let array: [u8; G1_SIZE] =
        bytes.try_into().map_err(|_| CryptoError::Malformed { what: "g1 point" })?;
    Option::from(G1Affine::from_compressed(&array)).ok_or(CryptoError::Malformed { what: "g1 point" })
}

fn g2_from_bytes(bytes: &[u8]) -> Result<G2Affine, CryptoError> {
    let array: [u8; G2_SIZE] =
        bytes.try_into().map_err(|_| CryptoError::Malformed { what: "g2 point" })?;
    Option::from(G2Affine::from_compressed(&array)).ok_or(CryptoError::Malformed { what: "g2 point" })
}

fn random_scalar(env: &impl Environment) -> Scalar {
    let mut wide = env.random_array::<64>();
    let scalar = Scalar::from_bytes_wide(&wide);
    wide.zeroize();
    scalar
}

fn scalars(path: &[Identity]) -> Result<Vec<Scalar>, CryptoError> {
    path.iter().map(Identity::scalar).collect()
}

fn header_ad(header: &HibeHeader, ad: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 * G1_SIZE + ad.len());
    out.extend_from_slice(&header.b);
    out.extend_from_slice(&header.c);
    out.extend_from_slice(ad);
    out
}

fn session_key(shared: &Gt) -> Secret<32> {
    let mut encoded = shared.to_string();
    let key = Secret::from_bytes(hash(b"ratchet hibe kem", &[encoded.as_bytes()]));
    encoded.zeroize();
    key
}

/// Generate parameters for `depth` levels and the root key.
pub fn setup(env: &impl Environment, depth: usize) -> (HibeParams, EntityKey) {
    let g = G1Projective::generator();
    let g_hat = G2Projective::generator();

    let alpha = random_scalar(env);
    let g2 = g_hat * random_scalar(env);
    let gamma = random_scalar(env);
    let (h, h_hat): (Vec<_>, Vec<_>) = (0..depth)
        .map(|_| {
            let eta = random_scalar(env);
            (G1Affine::from(g * eta), G2Affine::from(g_hat * eta))
        })
        .unzip();

    let params = HibeParams {
        g1: G1Affine::from(g * alpha),
        g2: G2Affine::from(g2),
        g3: G1Affine::from(g * gamma),
        g3_hat: G2Affine::from(g_hat * gamma),
        h,
        h_hat,
    };

    let r = random_scalar(env);
    let d0 = g2 * alpha + params.q_hat(&[]) * r;
    let d1 = g_hat * r;
    let b: Vec<G2Projective> = params.h_hat.iter().map(|h| G2Projective::from(h) * r).collect();

    (params, EntityKey::from_points(Vec::new(), d0, d1, &b))
}

/// Derive the key for `ancestor.path || id`.
///
/// Deterministic in `seed`: the same ancestor, identity and seed always
/// produce the same child key.
///
/// # Errors
///
/// - `DepthExhausted` if the ancestor is already at the bottom level
/// - `Malformed` if the ancestor key does not decode
pub fn extract(
    params: &HibeParams,
    ancestor: &EntityKey,
    id: &[u8],
    seed: &Secret<32>,
) -> Result<EntityKey, CryptoError> {
    let level = ancestor.path.len();
    let Some((b_next, b_rest)) = ancestor.b.split_first() else {
        return Err(CryptoError::DepthExhausted { depth: params.depth() });
    };

    let identity = Identity::hash(id);
    let mut path = ancestor.path.clone();
    path.push(identity);
    let path_scalars = scalars(&path)?;

    let mut wide = hash_wide(b"ratchet hibe extract", &[seed.as_bytes(), &identity.0]);
    let t = Scalar::from_bytes_wide(&wide);
    wide.zeroize();

    let d0 = G2Projective::from(g2_from_bytes(ancestor.d0.as_bytes())?)
        + G2Projective::from(g2_from_bytes(b_next.as_bytes())?) * identity.scalar()?
        + params.q_hat(&path_scalars) * t;
    let d1 = G2Projective::from(g2_from_bytes(ancestor.d1.as_bytes())?)
        + G2Projective::generator() * t;

    let mut b = Vec::with_capacity(b_rest.len());
    for (j, component) in b_rest.iter().enumerate() {
        let h_hat = params
            .h_hat
            .get(level + 1 + j)
            .ok_or(CryptoError::Malformed { what: "hibe key" })?;
        b.push(G2Projective::from(g2_from_bytes(component.as_bytes())?) + G2Projective::from(h_hat) * t);
    }

    Ok(EntityKey::from_points(path, d0, d1, &b))
}

/// Encrypt `msg` to the key at `path`.
///
/// # Errors
///
/// - `DepthExhausted` if `path` is longer than the hierarchy
pub fn encrypt(
    env: &impl Environment,
    params: &HibeParams,
    msg: &[u8],
    ad: &[u8],
    path: &[Identity],
) -> Result<HibeCiphertext, CryptoError> {
    if path.len() > params.depth() {
        return Err(CryptoError::DepthExhausted { depth: params.depth() });
    }
    let path_scalars = scalars(path)?;

    let s = random_scalar(env);
    let header = HibeHeader {
        b: G1Affine::from(G1Projective::generator() * s).to_compressed(),
        c: G1Affine::from(params.q(&path_scalars) * s).to_compressed(),
    };
    let shared = pairing(&params.g1, &params.g2) * s;
    let key = session_key(&shared);

    let c2 = XChaCha::encrypt(&key, msg, &header_ad(&header, ad));
    Ok(HibeCiphertext { c1: header, c2 })
}

/// Decrypt `ct` with a key for the path it was encrypted to.
///
/// A key for any other path yields a different session key, so the AEAD
/// rejects it.
pub fn decrypt(key: &EntityKey, ct: &HibeCiphertext, ad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let b = g1_from_bytes(&ct.c1.b).map_err(|_| CryptoError::AuthenticationFailed)?;
    let c = g1_from_bytes(&ct.c1.c).map_err(|_| CryptoError::AuthenticationFailed)?;
    let d0 = g2_from_bytes(key.d0.as_bytes())?;
    let d1 = g2_from_bytes(key.d1.as_bytes())?;

    let shared = pairing(&b, &d0) - pairing(&c, &d1);
    let session = session_key(&shared);

    XChaCha::decrypt(&session, &ct.c2, &header_ad(&ct.c1, ad))
}
