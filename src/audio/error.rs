use thiserror::Error;

/// Errores que el motor de reproducción reporta a quien lo llama.
///
/// Los fallos por canción (`ResolveFailure`) nunca llegan a quien llama:
/// el motor los absorbe, los registra y pasa a la siguiente entrada.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("no hay un canal de voz al que conectarse")]
    NotInChannel,

    #[error("error de conexión de voz: {0}")]
    Connection(String),

    #[error("no se pudo preparar la canción: {0}")]
    ResolveFailure(String),

    #[error("no se encontró `{0}` en la cola")]
    NotFound(String),

    #[error("ya hay una canción preparándose")]
    AlreadyInProgress,

    #[error("no hay nada reproduciéndose")]
    NothingPlaying,

    #[error("no hay nada en pausa")]
    NothingPaused,

    #[error("no hay conexión de voz activa")]
    NotConnected,
}

pub type PlaybackResult<T> = Result<T, PlaybackError>;
