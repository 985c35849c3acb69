//! Device interrogation over SMP

use anyhow::Result;
use netsweep_core::{Device, DeviceId, DeviceInfo, Endpoint, FirmwareImage, Transport};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use thiserror::Error;
use tracing::debug;

use crate::transport::SmpTransport;

/// Default MCUmgr UDP port
pub const MCUMGR_PORT: u16 = 1337;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("No MCUmgr device answered")]
    NoResponse,
    #[error("Transport error: {0}")]
    Transport(#[from] anyhow::Error),
}

/// What a device reported about itself
#[derive(Debug, Clone, Default)]
pub struct DeviceQueryResult {
    /// Hardware ID (chip unique ID)
    pub hwid: Option<String>,
    /// Full OS info string
    pub os_info: Option<String>,
    /// App name (e.g., "optical-flow")
    pub app_name: Option<String>,
    /// Board type (e.g., "mr_mcxn_t1")
    pub board: Option<String>,
    pub processor: Option<String>,
    pub images: Vec<ImageInfo>,
}

#[derive(Debug, Clone)]
pub struct ImageInfo {
    pub slot: u32,
    pub version: String,
    pub hash: String,
    pub pending: bool,
    pub confirmed: bool,
    pub active: bool,
}

#[derive(Serialize)]
struct OsInfoReq<'a> {
    format: &'a str,
}

#[derive(Deserialize)]
struct OsInfoRsp {
    output: String,
    #[serde(default)]
    rc: i32,
}

#[derive(Deserialize)]
struct ImageStateRsp {
    #[serde(default)]
    images: Vec<ImageEntry>,
}

#[derive(Deserialize)]
struct ImageEntry {
    #[serde(default)]
    slot: u32,
    #[serde(default)]
    version: String,
    #[serde(default)]
    hash: serde_bytes::ByteBuf,
    #[serde(default)]
    pending: bool,
    #[serde(default)]
    confirmed: bool,
    #[serde(default)]
    active: bool,
}

/// SMP groups, commands and operations used here
mod smp {
    pub const GROUP_DEFAULT: u16 = 0;
    pub const GROUP_IMAGE: u16 = 1;

    pub const ID_OS_INFO: u8 = 7;
    pub const ID_IMAGE_STATE: u8 = 0;

    pub const OP_READ: u8 = 0;
}

/// Check that an MCUmgr device answers, then ask it everything we know how to ask.
/// Individual queries that fail just leave their fields empty.
pub async fn query_device(transport: &mut SmpTransport<'_>) -> Result<DeviceQueryResult, QueryError> {
    if !transport.ping().await? {
        return Err(QueryError::NoResponse);
    }

    let mut result = DeviceQueryResult::default();

    if let Ok(hwid) = query_os_info(transport, "h").await {
        result.hwid = Some(hwid);
    }

    if let Ok(info) = query_os_info(transport, "a").await {
        let parsed = parse_os_info_fields(&info);
        result.app_name = parsed.app_name;
        result.board = parsed.board;
        result.os_info = Some(info);
    }

    if let Ok(processor) = query_os_info(transport, "p").await {
        result.processor = Some(processor);
    }

    match query_image_state(transport).await {
        Ok(images) => result.images = images,
        Err(e) => debug!(error = %e, "Image state query failed"),
    }

    Ok(result)
}

async fn query_os_info(transport: &mut SmpTransport<'_>, format: &str) -> Result<String> {
    let body = serde_cbor::to_vec(&OsInfoReq { format })?;
    let rsp_body = transport
        .transceive(smp::OP_READ, smp::GROUP_DEFAULT, smp::ID_OS_INFO, &body)
        .await?;

    let rsp: OsInfoRsp = serde_cbor::from_slice(&rsp_body)?;
    if rsp.rc != 0 {
        anyhow::bail!("OS info query failed with rc={}", rsp.rc);
    }
    Ok(rsp.output)
}

async fn query_image_state(transport: &mut SmpTransport<'_>) -> Result<Vec<ImageInfo>> {
    let body = serde_cbor::to_vec(&HashMap::<String, String>::new())?;
    let rsp_body = transport
        .transceive(smp::OP_READ, smp::GROUP_IMAGE, smp::ID_IMAGE_STATE, &body)
        .await?;

    let rsp: ImageStateRsp = serde_cbor::from_slice(&rsp_body)?;
    Ok(rsp
        .images
        .into_iter()
        .map(|img| ImageInfo {
            slot: img.slot,
            version: img.version,
            hash: hex_encode(&img.hash),
            pending: img.pending,
            confirmed: img.confirmed,
            active: img.active,
        })
        .collect())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[derive(Debug, Default, PartialEq, Eq)]
struct ParsedOsInfo {
    app_name: Option<String>,
    board: Option<String>,
}

/// Pull app and board names out of an "all fields" OS info string:
/// "Zephyr <app> <hash> <version> <date...> <arch> <proc> <board/soc/cpu> Zephyr hwid:<id>"
fn parse_os_info_fields(os_info: &str) -> ParsedOsInfo {
    let parts: Vec<&str> = os_info.split_whitespace().collect();

    let app_name = match parts.as_slice() {
        ["Zephyr", app, ..] => Some(app.to_string()),
        _ => None,
    };

    // first slash-separated token that isn't a version or the hwid
    let board = parts
        .iter()
        .filter(|p| !p.starts_with("hwid:"))
        .find(|p| p.contains('/') && !p.starts_with(|c: char| c.is_ascii_digit()))
        .and_then(|p| p.split('/').next())
        .map(str::to_string);

    ParsedOsInfo { app_name, board }
}

/// Build a device record from a query result
pub fn query_result_to_device(ip: IpAddr, port: u16, result: DeviceQueryResult) -> Device {
    let id = result
        .hwid
        .as_deref()
        .map(DeviceId::from_hwid)
        .unwrap_or_else(DeviceId::temporary);

    let name = result
        .app_name
        .clone()
        .or_else(|| result.board.clone())
        .unwrap_or_else(|| format!("device-{}", ip));

    // prefer the running image, then slot 0, then whatever came first
    let firmware = result
        .images
        .iter()
        .find(|i| i.active)
        .or_else(|| result.images.iter().find(|i| i.slot == 0))
        .or_else(|| result.images.first())
        .map(|img| FirmwareImage {
            slot: img.slot,
            version: img.version.clone(),
            hash: img.hash.clone(),
            confirmed: img.confirmed,
            pending: img.pending,
        });

    let endpoint = Endpoint {
        ip,
        port,
        transport: Transport::Udp,
    };
    Device {
        info: DeviceInfo {
            os_info: result.os_info,
            board: result.board,
            processor: result.processor,
        },
        firmware,
        ..Device::new(id, name, endpoint)
    }
}
