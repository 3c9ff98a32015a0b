//! Worker pool running verification pipelines on dedicated OS threads.
//!
//! ONNX sessions are not shared across threads; each worker owns a full
//! `Verifier` and drains its own request queue. Callers hold a cloneable
//! handle and await replies over oneshot channels.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use verid_core::{DocumentType, ExtractionResult, MatchResult, Verifier, VerifyError};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("verification failed: {0}")]
    Verify(#[from] VerifyError),
    #[error("worker startup failed: {0}")]
    Init(String),
    #[error("worker thread exited")]
    ChannelClosed,
}

/// Messages sent from request handlers to worker threads.
enum EngineRequest {
    Extract {
        image: Vec<u8>,
        document_type: DocumentType,
        reply: oneshot::Sender<Result<ExtractionResult, EngineError>>,
    },
    MatchFaces {
        selfie: Vec<u8>,
        document: Vec<u8>,
        reply: oneshot::Sender<Result<MatchResult, EngineError>>,
    },
}

/// Clone-safe handle to the worker pool. Requests are spread across
/// workers round-robin.
#[derive(Clone)]
pub struct EngineHandle {
    workers: Vec<mpsc::Sender<EngineRequest>>,
    next: Arc<AtomicUsize>,
}

impl EngineHandle {
    /// Extract structured identity fields from a document image.
    pub async fn extract_fields(
        &self,
        image: Vec<u8>,
        document_type: DocumentType,
    ) -> Result<ExtractionResult, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.dispatch(EngineRequest::Extract {
            image,
            document_type,
            reply: reply_tx,
        })
        .await?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Compare the face in a selfie against the face in a document photo.
    pub async fn match_faces(
        &self,
        selfie: Vec<u8>,
        document: Vec<u8>,
    ) -> Result<MatchResult, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.dispatch(EngineRequest::MatchFaces {
            selfie,
            document,
            reply: reply_tx,
        })
        .await?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    async fn dispatch(&self, request: EngineRequest) -> Result<(), EngineError> {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        self.workers[index]
            .send(request)
            .await
            .map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn `pool_size` workers, each with its own pipeline built by
/// `factory`. Every pipeline is constructed up front so a missing model
/// file fails startup instead of the first request.
pub fn spawn_pool<F>(pool_size: usize, factory: F) -> Result<EngineHandle, EngineError>
where
    F: Fn(usize) -> Result<Verifier, VerifyError>,
{
    let pool_size = pool_size.max(1);
    let mut workers = Vec::with_capacity(pool_size);

    for i in 0..pool_size {
        let mut verifier = factory(i).map_err(|e| EngineError::Init(e.to_string()))?;
        let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

        std::thread::Builder::new()
            .name(format!("verid-worker-{i}"))
            .spawn(move || {
                tracing::info!(worker = i, "worker thread started");
                while let Some(request) = rx.blocking_recv() {
                    match request {
                        EngineRequest::Extract {
                            image,
                            document_type,
                            reply,
                        } => {
                            let result = verifier
                                .extract_document_fields(&image, document_type)
                                .map_err(EngineError::from);
                            let _ = reply.send(result);
                        }
                        EngineRequest::MatchFaces {
                            selfie,
                            document,
                            reply,
                        } => {
                            let result = verifier
                                .match_faces(&selfie, &document)
                                .map_err(EngineError::from);
                            let _ = reply.send(result);
                        }
                    }
                }
                tracing::info!(worker = i, "worker thread exiting");
            })
            .map_err(|e| EngineError::Init(format!("spawning worker {i}: {e}")))?;

        workers.push(tx);
    }

    tracing::info!(pool_size, "worker pool ready");
    Ok(EngineHandle {
        workers,
        next: Arc::new(AtomicUsize::new(0)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageFormat};
    use std::io::Cursor;
    use verid_core::ocr::{OcrError, TextRecognizer};
    use verid_core::preprocess::PreparedImage;
    use verid_core::{
        FaceBox, FaceEncoding, FaceEngine, FaceError, MatchStatus, Region, TextToken,
        VerifierConfig,
    };

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = GrayImage::from_pixel(width, height, image::Luma([200]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    struct FixedRecognizer {
        tokens: Vec<TextToken>,
    }

    impl TextRecognizer for FixedRecognizer {
        fn recognize(&mut self, _image: &PreparedImage) -> Result<Vec<TextToken>, OcrError> {
            Ok(self.tokens.clone())
        }
    }

    struct SingleFace;

    impl FaceEngine for SingleFace {
        fn detect_and_encode(
            &mut self,
            _image: &PreparedImage,
        ) -> Result<Vec<FaceEncoding>, FaceError> {
            Ok(vec![FaceEncoding {
                values: vec![0.6, 0.8],
                face: FaceBox {
                    x: 10.0,
                    y: 10.0,
                    width: 40.0,
                    height: 40.0,
                    confidence: 0.9,
                    landmarks: None,
                },
                model_version: None,
            }])
        }
    }

    fn aadhaar_tokens() -> Vec<TextToken> {
        vec![TextToken {
            text: "234512345670".to_string(),
            region: Region {
                x: 20,
                y: 60,
                width: 140,
                height: 14,
            },
            confidence: 0.93,
        }]
    }

    fn test_pool(pool_size: usize) -> EngineHandle {
        spawn_pool(pool_size, |_| {
            Ok(Verifier::new(
                VerifierConfig::default(),
                Box::new(FixedRecognizer {
                    tokens: aadhaar_tokens(),
                }),
                Box::new(SingleFace),
            ))
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_extract_through_pool() {
        let handle = test_pool(1);
        let result = handle
            .extract_fields(png(300, 300), DocumentType::Aadhaar)
            .await
            .unwrap();
        assert_eq!(
            result.fields.document_number.unwrap().value,
            "234512345670"
        );
    }

    #[tokio::test]
    async fn test_match_through_pool() {
        let handle = test_pool(2);
        let result = handle
            .match_faces(png(100, 100), png(100, 100))
            .await
            .unwrap();
        assert_eq!(result.status, MatchStatus::Matched);
    }

    #[tokio::test]
    async fn test_round_robin_across_workers() {
        let handle = test_pool(3);
        for _ in 0..6 {
            let result = handle
                .match_faces(png(100, 100), png(100, 100))
                .await
                .unwrap();
            assert_eq!(result.status, MatchStatus::Matched);
        }
        assert_eq!(handle.next.load(Ordering::Relaxed), 6);
    }

    #[tokio::test]
    async fn test_pipeline_error_propagates() {
        let handle = test_pool(1);
        let err = handle
            .extract_fields(b"not an image".to_vec(), DocumentType::Pan)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Verify(_)));
    }

    #[tokio::test]
    async fn test_failing_factory_aborts_startup() {
        let result = spawn_pool(2, |i| {
            if i == 1 {
                Err(VerifyError::Face(FaceError::ModelNotFound(
                    "/missing/det_10g.onnx".to_string(),
                )))
            } else {
                Ok(Verifier::new(
                    VerifierConfig::default(),
                    Box::new(FixedRecognizer { tokens: vec![] }),
                    Box::new(SingleFace),
                ))
            }
        });
        assert!(matches!(result, Err(EngineError::Init(_))));
    }

    #[tokio::test]
    async fn test_handle_clone_shares_pool() {
        let handle = test_pool(1);
        let cloned = handle.clone();
        let result = cloned
            .extract_fields(png(300, 300), DocumentType::Aadhaar)
            .await
            .unwrap();
        assert!(result.fields.document_number.is_some());
    }
}
