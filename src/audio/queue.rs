use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tracing::{debug, info};

/// Una petición de reproducción encolada. Inmutable una vez creada.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub query: String,
    /// Orden de inserción, monotónico durante toda la sesión
    pub seq: u64,
    pub added_at: DateTime<Utc>,
}

/// Cola FIFO de peticiones pendientes.
///
/// No es thread-safe por sí misma: el motor la guarda detrás del mismo
/// mutex que usa para leerla, así que un snapshot nunca ve una escritura a medias.
#[derive(Debug, Default)]
pub struct TrackQueue {
    items: VecDeque<QueueEntry>,
    next_seq: u64,
}

impl TrackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega una petición al final y devuelve su posición (1-based) y la entrada
    pub fn push(&mut self, query: impl Into<String>) -> (usize, QueueEntry) {
        let entry = self.make_entry(query.into());
        info!("➕ Agregado a la cola: {}", entry.query);
        self.items.push_back(entry.clone());
        (self.items.len(), entry)
    }

    /// Agrega un lote completo sin que nadie pueda intercalarse
    pub fn push_many<I, S>(&mut self, queries: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let before = self.items.len();
        for query in queries {
            let entry = self.make_entry(query.into());
            self.items.push_back(entry);
        }
        let added = self.items.len() - before;
        info!("➕ Agregadas {} canciones a la cola", added);
        added
    }

    /// Saca la siguiente entrada (FIFO estricto)
    pub fn pop_front(&mut self) -> Option<QueueEntry> {
        let next = self.items.pop_front();
        match &next {
            Some(entry) => debug!("➡️ Siguiente en cola: {}", entry.query),
            None => debug!("📭 Cola vacía"),
        }
        next
    }

    pub fn get(&self, index: usize) -> Option<&QueueEntry> {
        self.items.get(index)
    }

    /// Copia ordenada de las entradas pendientes, sin tocar la cola
    pub fn snapshot(&self) -> Vec<QueueEntry> {
        self.items.iter().cloned().collect()
    }

    /// Vacía la cola y devuelve cuántas entradas se descartaron
    pub fn clear(&mut self) -> usize {
        let cleared = self.items.len();
        self.items.clear();
        if cleared > 0 {
            info!("🗑️ Cola limpiada: {} canciones removidas", cleared);
        }
        cleared
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Busca `target` en la cola y devuelve su índice (0-based).
    ///
    /// Política, en orden: coincidencia exacta sin distinguir mayúsculas,
    /// luego subcadena, y por último una posición 1-based.
    pub fn find_target(&self, target: &str) -> Option<usize> {
        let needle = target.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }

        if let Some(index) = self
            .items
            .iter()
            .position(|entry| entry.query.to_lowercase() == needle)
        {
            return Some(index);
        }

        if let Some(index) = self
            .items
            .iter()
            .position(|entry| entry.query.to_lowercase().contains(&needle))
        {
            return Some(index);
        }

        match needle.parse::<usize>() {
            Ok(position) if position >= 1 && position <= self.items.len() => Some(position - 1),
            _ => None,
        }
    }

    /// Descarta todo lo que está estrictamente antes de `index`.
    /// El resto conserva su orden relativo.
    pub fn discard_before(&mut self, index: usize) -> usize {
        let discarded = index.min(self.items.len());
        self.items.drain(..discarded);
        if discarded > 0 {
            info!("⏭️ Descartadas {} canciones de la cola", discarded);
        }
        discarded
    }

    fn make_entry(&mut self, query: String) -> QueueEntry {
        let seq = self.next_seq;
        self.next_seq += 1;
        QueueEntry {
            query,
            seq,
            added_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn queries(queue: &TrackQueue) -> Vec<String> {
        queue.snapshot().into_iter().map(|e| e.query).collect()
    }

    #[test]
    fn push_reports_one_based_position() {
        let mut queue = TrackQueue::new();
        assert_eq!(queue.push("a").0, 1);
        let (position, entry) = queue.push("b");
        assert_eq!((position, entry.query.as_str(), entry.seq), (2, "b", 1));
        assert_eq!(queue.pop_front().map(|e| e.query), Some("a".to_string()));
        assert_eq!(queue.push("c").0, 2);
    }

    #[test]
    fn entries_keep_insertion_order() {
        let mut queue = TrackQueue::new();
        queue.push("first");
        queue.push_many(["second", "third"]);
        let seqs: Vec<u64> = queue.snapshot().iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert_eq!(queries(&queue), vec!["first", "second", "third"]);
    }

    #[test]
    fn find_target_prefers_exact_over_substring() {
        let mut queue = TrackQueue::new();
        queue.push_many(["Song - Artist Remix", "song - artist", "3"]);
        assert_eq!(queue.find_target("SONG - ARTIST"), Some(1));
    }

    #[test]
    fn find_target_prefers_substring_over_position() {
        let mut queue = TrackQueue::new();
        queue.push_many(["intro", "track 1 live", "outro"]);
        // "1" aparece como subcadena en la segunda entrada antes de leerse como posición
        assert_eq!(queue.find_target("1"), Some(1));
    }

    #[test]
    fn find_target_falls_back_to_position() {
        let mut queue = TrackQueue::new();
        queue.push_many(["a", "b", "c", "d"]);
        assert_eq!(queue.find_target("3"), Some(2));
        assert_eq!(queue.find_target("0"), None);
        assert_eq!(queue.find_target("5"), None);
        assert_eq!(queue.find_target("zzz"), None);
        assert_eq!(queue.find_target("   "), None);
    }

    #[test]
    fn discard_before_keeps_remainder_order() {
        let mut queue = TrackQueue::new();
        queue.push_many(["a", "b", "c", "d"]);
        let index = queue.find_target("3").unwrap();
        assert_eq!(queue.discard_before(index), 2);
        assert_eq!(queries(&queue), vec!["c", "d"]);
    }

    #[test]
    fn clear_is_idempotent() {
        let mut queue = TrackQueue::new();
        queue.push_many(["a", "b"]);
        assert_eq!(queue.clear(), 2);
        assert_eq!(queue.clear(), 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn concurrent_snapshots_never_see_gaps_or_duplicates() {
        let queue = Arc::new(parking_lot::Mutex::new(TrackQueue::new()));

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = queue.clone();
                std::thread::spawn(move || {
                    for i in 0..250 {
                        queue.lock().push(format!("p{}-{}", p, i));
                    }
                })
            })
            .collect();

        let reader = {
            let queue = queue.clone();
            std::thread::spawn(move || {
                for _ in 0..200 {
                    let snapshot = queue.lock().snapshot();
                    // Sin consumidor, cada snapshot es un prefijo contiguo de la secuencia
                    for (expected, entry) in snapshot.iter().enumerate() {
                        assert_eq!(entry.seq, expected as u64);
                    }
                }
            })
        };

        for producer in producers {
            producer.join().unwrap();
        }
        reader.join().unwrap();

        assert_eq!(queue.lock().len(), 1000);
    }
}
