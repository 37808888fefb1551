//! AWS Signature Version 4 for JSON-protocol `POST /` requests.

use std::time::SystemTime;

use aws_credential_types::Credentials;
use aws_sigv4::{
    http_request::{sign as sign_request, SignableBody, SignableRequest, SigningSettings},
    sign::v4,
};
use aws_smithy_runtime_api::client::identity::Identity;

use crate::{Result, WarehouseError};

pub(crate) struct SigningRequest<'a> {
    pub url: &'a str,
    pub region: &'a str,
    pub service: &'a str,
    /// Headers covered by the signature besides `host` and `x-amz-date`.
    pub headers: &'a [(&'a str, &'a str)],
    pub body: &'a [u8],
}

/// Signs a POST and returns the headers to add to it: `x-amz-date`,
/// `authorization` and, for temporary credentials, `x-amz-security-token`.
pub(crate) fn sign(
    request: &SigningRequest<'_>,
    credentials: Credentials,
    time: SystemTime,
) -> Result<Vec<(String, String)>> {
    let identity: Identity = credentials.into();
    let params = v4::SigningParams::builder()
        .identity(&identity)
        .region(request.region)
        .name(request.service)
        .time(time)
        .settings(SigningSettings::default())
        .build()
        .map_err(|err| WarehouseError::Signing(err.to_string()))?
        .into();

    let signable = SignableRequest::new(
        "POST",
        request.url,
        request.headers.iter().copied(),
        SignableBody::Bytes(request.body),
    )
    .map_err(|err| WarehouseError::Signing(err.to_string()))?;

    let (instructions, _signature) = sign_request(signable, &params)
        .map_err(|err| WarehouseError::Signing(err.to_string()))?
        .into_parts();

    Ok(instructions
        .headers()
        .map(|(name, value)| (name.to_owned(), value.to_owned()))
        .collect())
}
