//! QR-code login page: the authorization URL plus a PNG rendering of it.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{DynamicImage, ImageFormat, Luma};
use qrcode::{EcLevel, QrCode};
use serde::Serialize;
use url::Url;

use crate::config::LoginConfig;
use crate::error::{Error, Result};

pub const QR_DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// Smallest edge of the rendered QR image, in pixels
const QR_MIN_SIZE: u32 = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginPage {
    pub url: String,
    pub state: String,
    /// PNG data URI of the QR code encoding `url`
    pub qr_code: String,
}

/// Build the login page for `app_id`. An empty `state` gets a random one.
pub fn get_login_page(
    config: &LoginConfig,
    app_id: &str,
    redirect_uri: &str,
    state: &str,
) -> Result<LoginPage> {
    if app_id.is_empty() {
        return Err(Error::config("app id is required"));
    }
    if redirect_uri.is_empty() {
        return Err(Error::config("redirect uri is required"));
    }

    let state = if state.is_empty() {
        uuid::Uuid::new_v4().simple().to_string()
    } else {
        state.to_string()
    };

    let url = authorize_url(config, app_id, redirect_uri, &state)?;
    let qr_code = qr_data_uri(&url)?;

    Ok(LoginPage {
        url,
        state,
        qr_code,
    })
}

fn authorize_url(
    config: &LoginConfig,
    app_id: &str,
    redirect_uri: &str,
    state: &str,
) -> Result<String> {
    let mut url = Url::parse(&config.authorize_url).map_err(|e| {
        Error::config(format!(
            "invalid authorize url {}: {}",
            config.authorize_url, e
        ))
    })?;
    url.query_pairs_mut()
        .append_pair("appid", app_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("scope", "snsapi_login")
        .append_pair("state", state);
    url.set_fragment(Some("wechat_redirect"));
    Ok(url.into())
}

fn qr_data_uri(data: &str) -> Result<String> {
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::H)
        .map_err(|e| Error::Qr(e.to_string()))?;
    let image = code
        .render::<Luma<u8>>()
        .min_dimensions(QR_MIN_SIZE, QR_MIN_SIZE)
        .build();

    let mut png = Vec::new();
    DynamicImage::ImageLuma8(image).write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

    Ok(format!("{}{}", QR_DATA_URI_PREFIX, BASE64.encode(&png)))
}
