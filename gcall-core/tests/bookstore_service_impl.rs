use bookstore_service::Bookstore;
use bookstore_service::pb::{CreateShelfRequest, Shelf};

use futures_util::Stream;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::{StreamExt, wrappers::ReceiverStream};
use tonic::{Request, Response, Status, Streaming};

pub struct BookstoreImpl;

#[tonic::async_trait]
impl Bookstore for BookstoreImpl {
    type ServerStreamShelvesStream = ReceiverStream<Result<Shelf, Status>>;
    type BidiStreamShelvesStream = Pin<Box<dyn Stream<Item = Result<Shelf, Status>> + Send>>;

    async fn create_shelf(
        &self,
        request: Request<CreateShelfRequest>,
    ) -> Result<Response<Shelf>, Status> {
        // Echo the shelf back, tagging it with whatever metadata arrived so
        // tests can observe header delivery.
        let note = request
            .metadata()
            .get("x-note")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let blob_len = request
            .metadata()
            .get_bin("x-blob-bin")
            .and_then(|v| v.to_bytes().ok())
            .map(|b| b.len());

        let mut shelf = request.into_inner().shelf.unwrap_or_default();
        if let Some(note) = note {
            shelf.theme = format!("{} [{}]", shelf.theme, note);
        }
        if let Some(len) = blob_len {
            shelf.theme = format!("{} bin:{}", shelf.theme, len);
        }
        Ok(Response::new(shelf))
    }

    async fn server_stream_shelves(
        &self,
        request: Request<CreateShelfRequest>,
    ) -> Result<Response<Self::ServerStreamShelvesStream>, Status> {
        let shelf = request.into_inner().shelf.unwrap_or_default();
        let (tx, rx) = mpsc::channel(4);

        tokio::spawn(async move {
            for i in 0..3 {
                tokio::time::sleep(Duration::from_millis(30)).await;
                let response = Shelf {
                    id: shelf.id,
                    theme: format!("{} - seq {}", shelf.theme, i),
                };
                if tx.send(Ok(response)).await.is_err() {
                    break;
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn client_stream_shelves(
        &self,
        request: Request<Streaming<CreateShelfRequest>>,
    ) -> Result<Response<Shelf>, Status> {
        let mut stream = request.into_inner();
        let mut merged = String::new();
        let mut id = 0;

        while let Some(req) = stream.next().await {
            let shelf = req?.shelf.unwrap_or_default();
            merged.push_str(&shelf.theme);
            id = shelf.id;
        }

        Ok(Response::new(Shelf { id, theme: merged }))
    }

    async fn bidi_stream_shelves(
        &self,
        request: Request<Streaming<CreateShelfRequest>>,
    ) -> Result<Response<Self::BidiStreamShelvesStream>, Status> {
        let mut in_stream = request.into_inner();
        let (tx, rx) = mpsc::channel(128);

        tokio::spawn(async move {
            while let Some(result) = in_stream.next().await {
                match result {
                    Ok(req) => {
                        let shelf = req.shelf.unwrap_or_default();
                        let resp = Shelf {
                            id: shelf.id,
                            theme: format!("echo: {}", shelf.theme),
                        };
                        if tx.send(Ok(resp)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        break;
                    }
                }
            }
        });

        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }
}
