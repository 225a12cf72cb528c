use std::{collections::BTreeSet, fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid conversion: {0}")]
pub struct ConversionError(String);

//--------------------------------------   AuthorisationId   ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct AuthorisationId(String);

impl AuthorisationId {
    /// A fresh random id in the familiar 8-4-4-4-12 hex layout.
    pub fn random() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        let hex = hex::encode(bytes);
        Self(format!("{}-{}-{}-{}-{}", &hex[0..8], &hex[8..12], &hex[12..16], &hex[16..20], &hex[20..32]))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<String> for AuthorisationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for AuthorisationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Display for AuthorisationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------       TppRole       ---------------------------------------------------------
/// The PSD2 roles a national competent authority can grant a payment service provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TppRole {
    /// Account servicing PSP (`PSP_AS`)
    Aspsp,
    /// Payment initiation service provider (`PSP_PI`)
    Pisp,
    /// Account information service provider (`PSP_AI`)
    Aisp,
    /// Issuer of card-based payment instruments (`PSP_IC`)
    Piisp,
}

impl TppRole {
    pub const ALL: [TppRole; 4] = [TppRole::Aspsp, TppRole::Pisp, TppRole::Aisp, TppRole::Piisp];

    /// The role object identifier under `0.4.0.19495.1` (ETSI TS 119 495).
    pub fn psd2_oid(&self) -> &'static str {
        match self {
            TppRole::Aspsp => "0.4.0.19495.1.1",
            TppRole::Pisp => "0.4.0.19495.1.2",
            TppRole::Aisp => "0.4.0.19495.1.3",
            TppRole::Piisp => "0.4.0.19495.1.4",
        }
    }

    /// The role name as it appears in the QC statement.
    pub fn psd2_name(&self) -> &'static str {
        match self {
            TppRole::Aspsp => "PSP_AS",
            TppRole::Pisp => "PSP_PI",
            TppRole::Aisp => "PSP_AI",
            TppRole::Piisp => "PSP_IC",
        }
    }

    pub fn from_psd2_oid(oid: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.psd2_oid() == oid)
    }

    pub fn from_psd2_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL.into_iter().find(|r| r.psd2_name() == name)
    }
}

impl Display for TppRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TppRole::Aspsp => write!(f, "ASPSP"),
            TppRole::Pisp => write!(f, "PISP"),
            TppRole::Aisp => write!(f, "AISP"),
            TppRole::Piisp => write!(f, "PIISP"),
        }
    }
}

impl FromStr for TppRole {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ASPSP" | "PSP_AS" => Ok(Self::Aspsp),
            "PISP" | "PSP_PI" => Ok(Self::Pisp),
            "AISP" | "PSP_AI" => Ok(Self::Aisp),
            "PIISP" | "PSP_IC" => Ok(Self::Piisp),
            s => Err(ConversionError(format!("Invalid TPP role: {s}"))),
        }
    }
}

//--------------------------------------  AuthorisationType  ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorisationType {
    /// Account information consent
    Ais,
    /// Payment initiation
    Pis,
    /// Cancellation of an initiated payment
    PisCancellation,
    /// A basket of payments and consents authorised together
    SigningBasket,
}

impl AuthorisationType {
    /// A TPP must hold at least one of these roles to drive an authorisation of this type.
    pub fn permitted_roles(&self) -> &'static [TppRole] {
        match self {
            AuthorisationType::Ais => &[TppRole::Aisp],
            AuthorisationType::Pis | AuthorisationType::PisCancellation => &[TppRole::Pisp],
            AuthorisationType::SigningBasket => &[TppRole::Pisp, TppRole::Aisp],
        }
    }

    pub fn is_permitted_for(&self, roles: &BTreeSet<TppRole>) -> bool {
        self.permitted_roles().iter().any(|r| roles.contains(r))
    }

    /// The path segment used for this authorisation type in the XS2A API.
    pub fn service_path(&self) -> &'static str {
        match self {
            AuthorisationType::Ais => "consents",
            AuthorisationType::Pis => "payments",
            AuthorisationType::PisCancellation => "payments-cancellation",
            AuthorisationType::SigningBasket => "signing-baskets",
        }
    }

    pub fn from_service_path(path: &str) -> Option<Self> {
        match path {
            "consents" => Some(Self::Ais),
            "payments" => Some(Self::Pis),
            "payments-cancellation" => Some(Self::PisCancellation),
            "signing-baskets" => Some(Self::SigningBasket),
            _ => None,
        }
    }
}

impl Display for AuthorisationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthorisationType::Ais => write!(f, "AIS"),
            AuthorisationType::Pis => write!(f, "PIS"),
            AuthorisationType::PisCancellation => write!(f, "PIS_CANCELLATION"),
            AuthorisationType::SigningBasket => write!(f, "SIGNING_BASKET"),
        }
    }
}

impl FromStr for AuthorisationType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AIS" => Ok(Self::Ais),
            "PIS" => Ok(Self::Pis),
            "PIS_CANCELLATION" => Ok(Self::PisCancellation),
            "SIGNING_BASKET" => Ok(Self::SigningBasket),
            s => Err(ConversionError(format!("Invalid authorisation type: {s}"))),
        }
    }
}

//--------------------------------------      ScaStatus      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "camelCase")]
pub enum ScaStatus {
    /// The authorisation exists, nothing has been submitted yet.
    Received,
    /// The PSU has been identified by the bank.
    PsuIdentified,
    /// The PSU has authenticated and must choose one of several SCA methods.
    PsuAuthenticated,
    /// An authorisation code has been sent using the chosen SCA method.
    ScaMethodSelected,
    /// The transaction was authorised. Terminal.
    Finalised,
    /// The bank waived SCA and the transaction was executed. Terminal.
    Exempted,
    /// Terminal.
    Failed,
}

impl ScaStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScaStatus::Finalised | ScaStatus::Exempted | ScaStatus::Failed)
    }

    /// The SCA status graph. Statuses only ever move forward; any non-terminal status may fail.
    ///
    /// | From                | To                                                                  |
    /// |---------------------|---------------------------------------------------------------------|
    /// | Received            | PsuIdentified, PsuAuthenticated, ScaMethodSelected, Finalised, Exempted, Failed |
    /// | PsuIdentified       | PsuAuthenticated, ScaMethodSelected, Finalised, Exempted, Failed    |
    /// | PsuAuthenticated    | ScaMethodSelected, Exempted, Failed                                 |
    /// | ScaMethodSelected   | Finalised, Failed                                                   |
    /// | Finalised, Exempted, Failed | -                                                           |
    ///
    /// `Received` reaches the authentication outcomes directly when the PSU was already known at creation and the
    /// first update carries the password.
    pub fn can_transition_to(&self, next: ScaStatus) -> bool {
        use ScaStatus::*;
        matches!(
            (self, next),
            (Received, PsuIdentified)
                | (Received | PsuIdentified, PsuAuthenticated | ScaMethodSelected | Finalised | Exempted)
                | (PsuAuthenticated, ScaMethodSelected | Exempted)
                | (ScaMethodSelected, Finalised)
                | (Received | PsuIdentified | PsuAuthenticated | ScaMethodSelected, Failed)
        )
    }
}

impl Display for ScaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScaStatus::Received => write!(f, "RECEIVED"),
            ScaStatus::PsuIdentified => write!(f, "PSU_IDENTIFIED"),
            ScaStatus::PsuAuthenticated => write!(f, "PSU_AUTHENTICATED"),
            ScaStatus::ScaMethodSelected => write!(f, "SCA_METHOD_SELECTED"),
            ScaStatus::Finalised => write!(f, "FINALISED"),
            ScaStatus::Exempted => write!(f, "EXEMPTED"),
            ScaStatus::Failed => write!(f, "FAILED"),
        }
    }
}

impl FromStr for ScaStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RECEIVED" => Ok(Self::Received),
            "PSU_IDENTIFIED" => Ok(Self::PsuIdentified),
            "PSU_AUTHENTICATED" => Ok(Self::PsuAuthenticated),
            "SCA_METHOD_SELECTED" => Ok(Self::ScaMethodSelected),
            "FINALISED" => Ok(Self::Finalised),
            "EXEMPTED" => Ok(Self::Exempted),
            "FAILED" => Ok(Self::Failed),
            s => Err(ConversionError(format!("Invalid SCA status: {s}"))),
        }
    }
}

//--------------------------------------      PsuIdData      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PsuIdData {
    pub psu_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub psu_id_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub psu_corporate_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub psu_corporate_id_type: Option<String>,
}

impl PsuIdData {
    pub fn new<S: Into<String>>(psu_id: S) -> Self {
        Self { psu_id: psu_id.into(), ..Default::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.psu_id.trim().is_empty()
    }
}

impl Display for PsuIdData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.psu_corporate_id {
            Some(corp) => write!(f, "{} ({corp})", self.psu_id),
            None => write!(f, "{}", self.psu_id),
        }
    }
}

//--------------------------------------      ScaMethod      ---------------------------------------------------------
/// An SCA method ("authentication object") the bank offers for a PSU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaMethod {
    pub authentication_method_id: String,
    /// e.g. `SMS_OTP`, `CHIP_OTP`, `PUSH_OTP`
    pub authentication_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl ScaMethod {
    pub fn new<S: Into<String>, T: Into<String>>(id: S, authentication_type: T) -> Self {
        Self {
            authentication_method_id: id.into(),
            authentication_type: authentication_type.into(),
            name: None,
            explanation: None,
        }
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }
}

//--------------------------------------    ChallengeData    ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otp_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otp_max_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_information: Option<String>,
}

//--------------------------------------     OpaqueState     ---------------------------------------------------------
/// Encrypted core-banking state and the id of the crypto provider that encrypted it.
#[derive(Clone, PartialEq, Eq)]
pub struct OpaqueState {
    pub data: Vec<u8>,
    pub provider_id: String,
}

impl std::fmt::Debug for OpaqueState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OpaqueState({} bytes, {})", self.data.len(), self.provider_id)
    }
}

//--------------------------------------    Authorisation    ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct Authorisation {
    pub id: AuthorisationId,
    pub authorisation_type: AuthorisationType,
    pub sca_status: ScaStatus,
    /// The external (encrypted) id of the consent or payment being authorised.
    pub resource_id: String,
    pub psu: Option<PsuIdData>,
    pub chosen_sca_method: Option<String>,
    pub available_sca_methods: Vec<ScaMethod>,
    pub opaque_state: Option<OpaqueState>,
    pub explicit: bool,
    /// Periodic payments are never exempted from SCA.
    pub periodic_payment: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Authorisation {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn sca_method(&self, method_id: &str) -> Option<&ScaMethod> {
        self.available_sca_methods.iter().find(|m| m.authentication_method_id == method_id)
    }
}

//--------------------------------------  NewAuthorisation   ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewAuthorisation {
    pub id: AuthorisationId,
    pub authorisation_type: AuthorisationType,
    pub resource_id: String,
    pub psu: Option<PsuIdData>,
    pub explicit: bool,
    pub periodic_payment: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl NewAuthorisation {
    pub fn new(authorisation_type: AuthorisationType, resource_id: String, expires_at: DateTime<Utc>) -> Self {
        Self {
            id: AuthorisationId::random(),
            authorisation_type,
            resource_id,
            psu: None,
            explicit: false,
            periodic_payment: false,
            created_at: Utc::now(),
            expires_at,
        }
    }

    pub fn with_psu(mut self, psu: PsuIdData) -> Self {
        self.psu = Some(psu);
        self
    }

    pub fn with_explicit(mut self, explicit: bool) -> Self {
        self.explicit = explicit;
        self
    }

    pub fn with_periodic_payment(mut self, periodic: bool) -> Self {
        self.periodic_payment = periodic;
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const ALL_STATUSES: [ScaStatus; 7] = [
        ScaStatus::Received,
        ScaStatus::PsuIdentified,
        ScaStatus::PsuAuthenticated,
        ScaStatus::ScaMethodSelected,
        ScaStatus::Finalised,
        ScaStatus::Exempted,
        ScaStatus::Failed,
    ];

    #[test]
    fn terminal_statuses_have_no_exits() {
        for from in ALL_STATUSES.iter().filter(|s| s.is_terminal()) {
            for to in ALL_STATUSES {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn statuses_never_move_backwards() {
        // ALL_STATUSES lists the happy path in order, so any allowed edge must point further down the list
        for (i, from) in ALL_STATUSES.iter().enumerate() {
            for (j, to) in ALL_STATUSES.iter().enumerate() {
                if from.can_transition_to(*to) {
                    assert!(j > i, "{from} -> {to}");
                }
            }
        }
    }

    #[test]
    fn every_live_status_can_fail() {
        for from in ALL_STATUSES.iter().filter(|s| !s.is_terminal()) {
            assert!(from.can_transition_to(ScaStatus::Failed));
        }
        assert!(!ScaStatus::ScaMethodSelected.can_transition_to(ScaStatus::Exempted));
        assert!(!ScaStatus::PsuAuthenticated.can_transition_to(ScaStatus::Finalised));
        assert!(!ScaStatus::ScaMethodSelected.can_transition_to(ScaStatus::PsuAuthenticated));
    }

    #[test]
    fn sca_status_strings() {
        for status in ALL_STATUSES {
            assert_eq!(status.to_string().parse::<ScaStatus>().unwrap(), status);
        }
        assert_eq!(serde_json::to_string(&ScaStatus::ScaMethodSelected).unwrap(), "\"scaMethodSelected\"");
    }

    #[test]
    fn roles_by_oid_and_name() {
        assert_eq!(TppRole::from_psd2_oid("0.4.0.19495.1.3"), Some(TppRole::Aisp));
        assert_eq!(TppRole::from_psd2_name("PSP_IC"), Some(TppRole::Piisp));
        assert_eq!(TppRole::from_psd2_oid("1.2.3.4"), None);
        assert_eq!(TppRole::from_psd2_name("PSP_XX"), None);
        assert_eq!("PSP_PI".parse::<TppRole>().unwrap(), TppRole::Pisp);
    }

    #[test]
    fn permitted_roles() {
        let aisp = BTreeSet::from([TppRole::Aisp]);
        let pisp = BTreeSet::from([TppRole::Pisp]);
        let aspsp = BTreeSet::from([TppRole::Aspsp]);
        assert!(AuthorisationType::Ais.is_permitted_for(&aisp));
        assert!(!AuthorisationType::Pis.is_permitted_for(&aisp));
        assert!(AuthorisationType::PisCancellation.is_permitted_for(&pisp));
        assert!(AuthorisationType::SigningBasket.is_permitted_for(&aisp));
        for t in [AuthorisationType::Ais, AuthorisationType::Pis, AuthorisationType::SigningBasket] {
            assert!(!t.is_permitted_for(&aspsp));
        }
    }

    #[test]
    fn authorisation_ids() {
        let id = AuthorisationId::random();
        assert_eq!(id.as_str().len(), 36);
        assert_ne!(id, AuthorisationId::random());
        for service in ["consents", "payments", "payments-cancellation", "signing-baskets"] {
            assert_eq!(AuthorisationType::from_service_path(service).unwrap().service_path(), service);
        }
    }
}
