use actix_web::{http::StatusCode, test::TestRequest};

use super::helpers::{qwac_header, tpp_request, TestGateway, ROGUE_QWAC, TPP_QWAC};

#[actix_web::test]
async fn health_needs_no_certificate() {
    let gateway = TestGateway::new().await;
    let (status, body) = gateway.send(TestRequest::get().uri("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_str(), Some("👍️\n"));
}

#[actix_web::test]
async fn requests_without_a_certificate_are_rejected() {
    let gateway = TestGateway::new().await;
    let resource_id = gateway.resource_id("consent-1");
    let (status, body) =
        gateway.send(TestRequest::post().uri(&format!("/v1/consents/{resource_id}/authorisations"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "CERTIFICATE_MISSING");
}

#[actix_web::test]
async fn garbage_certificates_are_rejected() {
    let gateway = TestGateway::new().await;
    let resource_id = gateway.resource_id("consent-1");
    let req = TestRequest::post()
        .uri(&format!("/v1/consents/{resource_id}/authorisations"))
        .insert_header(qwac_header("this is not a certificate"));
    let (status, body) = gateway.send(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "CERTIFICATE_INVALID");
}

#[actix_web::test]
async fn certificates_from_an_unknown_ca_are_rejected() {
    let gateway = TestGateway::new().await;
    let resource_id = gateway.resource_id("consent-1");
    let req = TestRequest::post()
        .uri(&format!("/v1/consents/{resource_id}/authorisations"))
        .insert_header(qwac_header(ROGUE_QWAC));
    let (status, body) = gateway.send(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "CERTIFICATE_INVALID");
    assert!(gateway.authorisation_api().authorisation_ids_for_resource(&resource_id).await.unwrap().is_empty());
}

#[actix_web::test]
async fn multiline_pem_is_accepted_after_proxy_flattening() {
    let gateway = TestGateway::new().await;
    let resource_id = gateway.resource_id("consent-1");
    let flattened = TPP_QWAC.lines().collect::<Vec<_>>().join(" ");
    let req = TestRequest::post()
        .uri(&format!("/v1/consents/{resource_id}/authorisations"))
        .insert_header(qwac_header(&flattened));
    let (status, _) = gateway.send(req).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) =
        gateway.send(tpp_request(TestRequest::get().uri(&format!("/v1/consents/{resource_id}/authorisations")))).await;
    assert_eq!(status, StatusCode::OK);
}
