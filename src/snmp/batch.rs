//! Chunked get / get-next for known instances.

use rust_decimal::Decimal;

use crate::snmp::{ObjectId, SnmpError, SnmpTransport};

/// Default max OIDs per request.
pub const DEFAULT_MAX_OIDS: usize = 20;

/// Request kind used for every chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    /// Read the named instances.
    Get,
    /// Read the first instance below each named OID.
    GetNext,
}

/// One coerced value, carrying the caller's tag for the OID it answers.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample<T> {
    pub tag: T,
    pub oid: ObjectId,
    pub value: Decimal,
}

/// Result of a batch run.
///
/// `samples` holds everything read before `error`, if any, ended the run.
#[derive(Debug)]
pub struct BatchOutcome<T> {
    pub samples: Vec<Sample<T>>,
    /// Bindings whose value could not be coerced.
    pub dropped: usize,
    /// First failed chunk; later chunks were not sent.
    pub error: Option<SnmpError>,
}

/// Splits requests into chunks of at most `max_oids` and fetches them in
/// order.
#[derive(Debug, Clone, Copy)]
pub struct Batcher {
    mode: BatchMode,
    max_oids: usize,
}

impl Batcher {
    pub fn new(mode: BatchMode, max_oids: usize) -> Self {
        Self {
            mode,
            max_oids: max_oids.max(1),
        }
    }

    pub fn max_oids(&self) -> usize {
        self.max_oids
    }

    /// Fetch every `(oid, tag)` pair.
    ///
    /// Bindings are matched to requests by position. A value that fails
    /// coercion drops only that sample; a failed chunk stops the run.
    pub async fn run<T, X>(&self, transport: &mut X, requests: &[(ObjectId, T)]) -> BatchOutcome<T>
    where
        T: Clone + Send + Sync,
        X: SnmpTransport + ?Sized,
    {
        let mut outcome = BatchOutcome {
            samples: Vec::with_capacity(requests.len()),
            dropped: 0,
            error: None,
        };

        for chunk in requests.chunks(self.max_oids) {
            let oids: Vec<ObjectId> = chunk.iter().map(|(oid, _)| oid.clone()).collect();
            let response = match self.mode {
                BatchMode::Get => transport.get(&oids).await,
                BatchMode::GetNext => transport.get_next(&oids).await,
            };

            let binds = match response {
                Ok(binds) if binds.len() == chunk.len() => binds,
                Ok(binds) => {
                    outcome.error = Some(SnmpError::Protocol(format!(
                        "expected {} bindings, got {}",
                        chunk.len(),
                        binds.len()
                    )));
                    break;
                }
                Err(e) => {
                    outcome.error = Some(e);
                    break;
                }
            };

            for ((requested, tag), bind) in chunk.iter().zip(binds) {
                match bind.value.to_decimal() {
                    Ok(value) => outcome.samples.push(Sample {
                        tag: tag.clone(),
                        oid: bind.oid,
                        value,
                    }),
                    Err(e) => {
                        tracing::warn!(oid = %requested, error = %e, "Sample dropped");
                        outcome.dropped += 1;
                    }
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snmp::{SnmpValue, VarBind};

    /// Answers `get` with the last arc as a counter; records chunk sizes.
    #[derive(Default)]
    struct EchoAgent {
        chunks: Vec<usize>,
        fail_on_chunk: Option<usize>,
    }

    #[async_trait::async_trait]
    impl SnmpTransport for EchoAgent {
        async fn get(&mut self, oids: &[ObjectId]) -> Result<Vec<VarBind>, SnmpError> {
            self.chunks.push(oids.len());
            if self.fail_on_chunk == Some(self.chunks.len()) {
                return Err(SnmpError::Timeout { attempts: 3 });
            }
            Ok(oids
                .iter()
                .map(|o| {
                    let v = o.last_arc().unwrap_or(0);
                    let value = if v == 13 {
                        SnmpValue::NoSuchInstance
                    } else {
                        SnmpValue::Counter64(v)
                    };
                    VarBind::new(o.clone(), value)
                })
                .collect())
        }

        async fn get_next(&mut self, oids: &[ObjectId]) -> Result<Vec<VarBind>, SnmpError> {
            self.chunks.push(oids.len());
            Ok(oids
                .iter()
                .map(|o| VarBind::new(o.join(&[0]), SnmpValue::OctetString(b"5".to_vec())))
                .collect())
        }
    }

    fn requests(n: u64) -> Vec<(ObjectId, u64)> {
        let base: ObjectId = "1.3.6.1.2.1.31.1.1.1.6".parse().unwrap();
        (1..=n).map(|i| (base.join(&[i]), i)).collect()
    }

    #[tokio::test]
    async fn test_chunks_respect_limit() {
        let mut agent = EchoAgent::default();
        let outcome = Batcher::new(BatchMode::Get, 20)
            .run(&mut agent, &requests(45))
            .await;

        assert_eq!(agent.chunks, vec![20, 20, 5]);
        assert!(outcome.error.is_none());
        // instance 13 answered noSuchInstance
        assert_eq!(outcome.samples.len(), 44);
        assert_eq!(outcome.dropped, 1);
        assert_eq!(outcome.samples[0].tag, 1);
        assert_eq!(outcome.samples[0].value, Decimal::from(1));
    }

    #[tokio::test]
    async fn test_failed_chunk_aborts_rest() {
        let mut agent = EchoAgent {
            fail_on_chunk: Some(2),
            ..Default::default()
        };
        let outcome = Batcher::new(BatchMode::Get, 10)
            .run(&mut agent, &requests(35))
            .await;

        assert_eq!(agent.chunks, vec![10, 10]);
        assert!(matches!(outcome.error, Some(SnmpError::Timeout { .. })));
        assert_eq!(outcome.samples.len(), 10);
    }

    #[tokio::test]
    async fn test_get_next_mode() {
        let mut agent = EchoAgent::default();
        let outcome = Batcher::new(BatchMode::GetNext, 0)
            .run(&mut agent, &requests(2))
            .await;

        assert_eq!(agent.chunks, vec![1, 1]);
        assert_eq!(outcome.samples.len(), 2);
        assert_eq!(outcome.samples[1].oid.to_string(), "1.3.6.1.2.1.31.1.1.1.6.2.0");
        assert_eq!(outcome.samples[1].value, Decimal::from(5));
    }
}
