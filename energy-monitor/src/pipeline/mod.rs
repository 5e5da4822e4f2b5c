use std::{pin::Pin, sync::Arc, time::SystemTime};

use futures::{Stream, StreamExt};

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub received_at: SystemTime,
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("source error: {0}")]
    Source(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("conversion error: {0}")]
    Conversion(String),
    #[error("sink error: {0}")]
    Sink(String),
}

#[async_trait::async_trait]
pub trait Source<T>: Send + Sync {
    async fn stream(
        &self,
    ) -> Pin<Box<dyn Stream<Item = Result<Envelope<T>, PipelineError>> + Send>>;
}

#[async_trait::async_trait]
pub trait Transform<I, O>: Send + Sync {
    async fn apply(&self, input: Envelope<I>) -> Result<Envelope<O>, PipelineError>;
}

#[async_trait::async_trait]
pub trait Sink<T>: Send + Sync {
    async fn run<S>(&self, input: S) -> Result<(), PipelineError>
    where
        S: Stream<Item = Result<Envelope<T>, PipelineError>> + Send + Unpin + 'static;
}

/// Source of raw `I` payloads, decoded once into `O`, then passed through a
/// chain of same-type transforms into the sink.
///
/// Items are processed strictly one after another: the next message is not
/// pulled from the source until the sink has finished with the previous one.
pub struct Pipeline<S, I, O, K> {
    pub source: S,
    pub decode: Arc<dyn Transform<I, O> + Send + Sync>,
    pub transforms: Vec<Arc<dyn Transform<O, O> + Send + Sync>>,
    pub sink: K,
}

impl<S, I, O, K> Pipeline<S, I, O, K>
where
    I: Send + 'static,
    O: Send + 'static,
    S: Source<I> + Send + Sync + 'static,
    K: Sink<O> + Send + Sync + 'static,
{
    pub async fn run(self) -> Result<(), PipelineError> {
        let raw = self.source.stream().await;

        let decode = self.decode.clone();
        let mut stream: Pin<Box<dyn Stream<Item = Result<Envelope<O>, PipelineError>> + Send>> =
            Box::pin(raw.then(move |item| {
                let decode = decode.clone();
                async move {
                    match item {
                        Ok(env) => decode.apply(env).await,
                        Err(e) => Err(e),
                    }
                }
            }));

        // Apply transforms in sequence (if any).
        for t in self.transforms {
            let t_arc = t.clone();
            stream = Box::pin(stream.then(move |item| {
                let t_inner = t_arc.clone();
                async move {
                    match item {
                        Ok(env) => t_inner.apply(env).await,
                        Err(e) => Err(e),
                    }
                }
            }));
        }

        self.sink.run(stream).await
    }
}
