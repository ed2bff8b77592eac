// DANS : src/error.rs

//! Les erreurs typées du pipeline.
//!
//! Aucune de ces erreurs ne remonte jusqu'à un "appelant" sur le chemin du stream :
//! chaque composant la traite localement (reconnexion, log, abandon silencieux, compteur).
//! Seul le démarrage (connexion initiale, resync initial) est fatal.

use thiserror::Error;

/// Erreurs du client d'ingestion (connexion unique vers le fournisseur de stream).
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Échec de la connexion (jeton du limiteur expiré ou dial en échec). Transitoire.
    #[error("connexion au stream impossible : {0}")]
    Connection(String),

    #[error("aucune connexion active")]
    NotConnected,

    /// L'écriture de la requête d'abonnement a échoué. Le canal orphelin est déjà retiré.
    #[error("abonnement impossible pour {program} : {reason}")]
    Subscription { program: String, reason: String },

    #[error("le client est fermé")]
    Closed,
}

/// Erreurs du registre des intérêts.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Redis injoignable ou en timeout. Sur le chemin chaud, équivaut à "pas de correspondance".
    #[error("registre indisponible : {0}")]
    Unavailable(#[from] redis::RedisError),

    #[error("donnée corrompue dans le registre : {0}")]
    Corrupt(String),
}

/// Erreurs du parser d'événements.
///
/// `NotRecognized` est le cas fréquent et attendu (on l'ignore sans log),
/// `Malformed` signale un payload inattendu (on le logue puis on l'ignore).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("payload malformé : {0}")]
    Malformed(&'static str),

    #[error("événement non reconnu")]
    NotRecognized,
}

/// Erreurs d'envoi non bloquant dans une file bornée.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("file pleine, message abandonné")]
    Full,

    #[error("file fermée")]
    Closed,
}
