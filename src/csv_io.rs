use crate::models::{BalanceOutput, NewAccount, TransferRequest};
use csv_async::{AsyncReaderBuilder, AsyncWriterBuilder};
use futures::stream::Stream;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::compat::{TokioAsyncReadCompatExt, TokioAsyncWriteCompatExt};

fn stream_rows<R, T>(reader: R) -> impl Stream<Item = Result<T, csv_async::Error>>
where
    R: AsyncRead + Unpin + Send + 'static,
    T: DeserializeOwned + 'static,
{
    let compat_reader = reader.compat();
    let csv_reader = AsyncReaderBuilder::new()
        .trim(csv_async::Trim::All)
        .flexible(true)
        .create_deserializer(compat_reader);

    csv_reader.into_deserialize::<T>()
}

/// Stream account seed rows (`id,owner,balance`) from async reader
pub fn stream_accounts<R: AsyncRead + Unpin + Send + 'static>(
    reader: R,
) -> impl Stream<Item = Result<NewAccount, csv_async::Error>> {
    stream_rows(reader)
}

/// Stream transfer rows (`from,to,amount`) from async reader
pub fn stream_transfers<R: AsyncRead + Unpin + Send + 'static>(
    reader: R,
) -> impl Stream<Item = Result<TransferRequest, csv_async::Error>> {
    stream_rows(reader)
}

pub async fn write_balances<W: AsyncWrite + Unpin>(
    mut writer: W,
    balances: Vec<BalanceOutput>,
) -> Result<(), anyhow::Error> {
    // Header goes out even when there are no rows
    writer.write_all(b"id,owner,balance\n").await?;

    let mut serializer = AsyncWriterBuilder::new()
        .has_headers(false)
        .create_serializer((&mut writer).compat_write());
    for row in &balances {
        serializer.serialize(row).await?;
    }
    serializer.flush().await?;
    drop(serializer);

    writer.flush().await?;
    Ok(())
}
