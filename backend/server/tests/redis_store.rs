use std::{
    collections::HashMap,
    io,
    sync::{Arc, Mutex},
};

use server::{
    database::{RedisSheet, init_redis},
    store::{RowStore, StoreError, open_or_create},
    survey,
};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};

const SHEET: &str = "Yanıtlar";

/// Just enough of a Redis server for the response store's commands.
#[derive(Default)]
struct Keyspace {
    strings: HashMap<Vec<u8>, Vec<u8>>,
    lists: HashMap<Vec<u8>, Vec<Vec<u8>>>,
    setnx_calls: usize,
}

type Shared = Arc<Mutex<Keyspace>>;

fn invalid(line: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("bad frame {line:?}"))
}

async fn read_frame<R: AsyncBufRead + Unpin>(reader: &mut R) -> io::Result<Option<Vec<Vec<u8>>>> {
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(None);
    }

    let count: usize = line
        .trim_end()
        .strip_prefix('*')
        .and_then(|count| count.parse().ok())
        .ok_or_else(|| invalid(&line))?;

    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        line.clear();
        reader.read_line(&mut line).await?;
        let len: usize = line
            .trim_end()
            .strip_prefix('$')
            .and_then(|len| len.parse().ok())
            .ok_or_else(|| invalid(&line))?;

        let mut arg = vec![0; len + 2];
        reader.read_exact(&mut arg).await?;
        arg.truncate(len);
        args.push(arg);
    }

    Ok(Some(args))
}

fn bulk(out: &mut Vec<u8>, value: &[u8]) {
    out.extend_from_slice(format!("${}\r\n", value.len()).as_bytes());
    out.extend_from_slice(value);
    out.extend_from_slice(b"\r\n");
}

fn reply(keyspace: &mut Keyspace, args: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();

    match String::from_utf8_lossy(&args[0]).to_ascii_uppercase().as_str() {
        "SETNX" => {
            keyspace.setnx_calls += 1;
            let created = !keyspace.strings.contains_key(&args[1]);
            if created {
                keyspace.strings.insert(args[1].clone(), args[2].clone());
            }
            out.extend_from_slice(if created { b":1\r\n" } else { b":0\r\n" });
        }
        "GET" => match keyspace.strings.get(&args[1]) {
            Some(value) => bulk(&mut out, value),
            None => out.extend_from_slice(b"$-1\r\n"),
        },
        "RPUSH" => {
            let list = keyspace.lists.entry(args[1].clone()).or_default();
            list.extend(args[2..].iter().cloned());
            out.extend_from_slice(format!(":{}\r\n", list.len()).as_bytes());
        }
        // The store only asks for whole lists.
        "LRANGE" => {
            let list = keyspace.lists.get(&args[1]).cloned().unwrap_or_default();
            out.extend_from_slice(format!("*{}\r\n", list.len()).as_bytes());
            for item in &list {
                bulk(&mut out, item);
            }
        }
        "PING" => out.extend_from_slice(b"+PONG\r\n"),
        _ => out.extend_from_slice(b"+OK\r\n"),
    }

    out
}

async fn connection(stream: TcpStream, shared: Shared) -> io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    while let Some(args) = read_frame(&mut reader).await? {
        let out = reply(&mut shared.lock().unwrap(), &args);
        writer.write_all(&out).await?;
    }

    Ok(())
}

async fn serve(shared: Shared) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(connection(stream, shared.clone()));
        }
    });

    format!("redis://{address}")
}

fn row(username: &str) -> Vec<String> {
    let mut row = vec![String::new(); survey::COLUMN_COUNT];
    row[0] = "2025-01-01T00:00:00.000000+00:00".to_string();
    row[1] = username.to_string();
    row
}

#[tokio::test]
async fn reopen_writes_header_once() {
    let shared = Shared::default();
    let url = serve(shared.clone()).await;

    let first = RedisSheet::open_or_create(&url, SHEET, &survey::header())
        .await
        .unwrap();
    first.append(&row("bayi1")).await.unwrap();

    let second = RedisSheet::open_or_create(&url, SHEET, &["other".to_string()])
        .await
        .unwrap();
    let table = second.read_all().await.unwrap();

    assert_eq!(table.header, survey::header());
    assert_eq!(table.rows, vec![row("bayi1")]);

    let keyspace = shared.lock().unwrap();
    assert_eq!(keyspace.setnx_calls, 2);
    assert_eq!(keyspace.strings.len(), 1);
}

#[tokio::test]
async fn redis_urls_open_redis_sheets() {
    let shared = Shared::default();
    let url = serve(shared.clone()).await;

    let store = open_or_create(&url, SHEET, None).await.unwrap();
    assert_eq!(store.backend_tag(), "redis");

    store.append(&row("bayi2")).await.unwrap();
    store.append(&row("bayi3")).await.unwrap();

    let table = store.read_all().await.unwrap();
    assert_eq!(table.rows, vec![row("bayi2"), row("bayi3")]);
}

#[tokio::test]
async fn missing_header_is_a_read_error() {
    let shared = Shared::default();
    let url = serve(shared.clone()).await;
    let store = RedisSheet::open_or_create(&url, SHEET, &survey::header())
        .await
        .unwrap();

    shared.lock().unwrap().strings.clear();

    assert!(matches!(store.read_all().await, Err(StoreError::Read(_))));
}

#[tokio::test]
async fn closed_port_is_unreachable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("redis://{}", listener.local_addr().unwrap());
    drop(listener);

    assert!(matches!(init_redis(&url).await, Err(StoreError::Unreachable(_))));
}
