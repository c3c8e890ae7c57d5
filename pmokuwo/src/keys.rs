//! Dérivation des clés de cache à partir des URLs
//!
//! Les URLs sont d'abord canonisées (suppression du port `:81` utilisé par
//! certains serveurs Kuwo), puis hachées :
//! - SHA-512 pour les clés du cache clé/valeur,
//! - SHA-1 (hexadécimal) pour les noms de fichiers.

use sha1::Sha1;
use sha2::{Digest, Sha512};
use std::fmt;

/// Marqueur de port non standard retiré avant hachage
const PORT_MARKER: &str = ":81";

/// Canonise une URL avant hachage
///
/// Seul le port `:81` de l'autorité est retiré : `http://host:81/a` et
/// `http://host/a` désignent la même ressource.
pub fn canonical_url(url: &str) -> String {
    let (scheme, rest) = match url.find("://") {
        Some(idx) => url.split_at(idx + 3),
        None => ("", url),
    };
    let authority_end = rest.find('/').unwrap_or(rest.len());
    let (authority, path) = rest.split_at(authority_end);

    match authority.strip_suffix(PORT_MARKER) {
        Some(host) => format!("{scheme}{host}{path}"),
        None => url.to_string(),
    }
}

/// Clé opaque du cache clé/valeur (SHA-512 de l'URL canonisée)
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(Vec<u8>);

impl CacheKey {
    pub fn from_url(url: &str) -> Self {
        let digest = Sha512::digest(canonical_url(url).as_bytes());
        CacheKey(digest.to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({}…)", &hex::encode(&self.0)[..16])
    }
}

/// SHA-1 hexadécimal d'une chaîne, utilisé pour nommer les fichiers
pub fn hash_str(s: &str) -> String {
    hex::encode(Sha1::digest(s.as_bytes()))
}
