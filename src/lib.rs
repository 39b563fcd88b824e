//! Headless core of the ScanBack scan page.
//!
//! A finder scans a physical tag and lands on `/scan/<code>`. This crate
//! decides everything that happens next: fetching the tag record, choosing
//! between the activation form and the finder contact view, validating the
//! form, and firing the single activation mutation. The shell renders the
//! `ViewModel` and services the capability requests; no I/O happens here.

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod capabilities;
pub mod form;
pub mod validate;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use app::App;
pub use capabilities::{ApiError, ApiOperation, ApiOutput, ApiResult, Capabilities, Effect};
pub use form::{
    ActivationForm, ContactField, ContactForm, DetailField, FormField, PhoneErrors, Section,
    SectionFlags, Setting,
};

pub const DEFAULT_COUNTRY: &str = "ZA";
pub const MIN_PHONE_DIGITS: usize = 7;
pub const MAX_PHONE_DIGITS: usize = 15;
pub const MAX_AGE_YEARS: u32 = 50;
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

pub const REQUIRED_FIELDS_BANNER: &str = "Please fill in all required fields.";
pub const VALIDATION_BANNER: &str = "Please fix validation errors before submitting.";
pub const TIMEOUT_MESSAGE: &str = "The request timed out. Please try again.";
pub const INACTIVE_TAG_MESSAGE: &str = "This tag is currently inactive.";
pub const NOT_FOUND_MESSAGE: &str = "This tag could not be found.";
pub const LOAD_FALLBACK_MESSAGE: &str = "Failed to load tag details. Please try again later.";
pub const SUBMIT_FALLBACK_MESSAGE: &str = "Activation failed. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Network,
    Timeout,
    TagInactive,
    NotFound,
    Validation,
    Submission,
    ImageTooLarge,
    ImageFormatUnsupported,
    Internal,
    Unknown,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Network => "NETWORK_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::TagInactive => "TAG_INACTIVE",
            Self::NotFound => "NOT_FOUND",
            Self::Validation => "VALIDATION_ERROR",
            Self::Submission => "SUBMISSION_ERROR",
            Self::ImageTooLarge => "IMAGE_TOO_LARGE",
            Self::ImageFormatUnsupported => "IMAGE_FORMAT_UNSUPPORTED",
            Self::Internal => "INTERNAL_ERROR",
            Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// A retry action is only offered for timeout-class failures.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Timeout)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self.kind {
            ErrorKind::Timeout => TIMEOUT_MESSAGE.into(),
            ErrorKind::TagInactive => INACTIVE_TAG_MESSAGE.into(),
            ErrorKind::NotFound => NOT_FOUND_MESSAGE.into(),
            ErrorKind::Validation | ErrorKind::Submission => self.message.clone(),
            ErrorKind::ImageTooLarge => format!(
                "The image is too large. Please use an image smaller than {} MB.",
                MAX_IMAGE_BYTES / (1024 * 1024)
            ),
            ErrorKind::ImageFormatUnsupported => {
                "This image format is not supported. Please use JPEG, PNG, or WebP.".into()
            }
            ErrorKind::Network | ErrorKind::Unknown => {
                if self.message.is_empty() {
                    LOAD_FALLBACK_MESSAGE.into()
                } else {
                    self.message.clone()
                }
            }
            ErrorKind::Internal => "An unexpected error occurred. Please try again.".into(),
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)
    }
}

impl std::error::Error for AppError {}

#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageError {
    #[error("image size {size} bytes exceeds maximum of {max} bytes")]
    TooLarge { size: usize, max: usize },
    #[error("unsupported image format: {mime_type}")]
    UnsupportedFormat { mime_type: String },
}

impl From<ImageError> for AppError {
    fn from(e: ImageError) -> Self {
        let kind = match &e {
            ImageError::TooLarge { .. } => ErrorKind::ImageTooLarge,
            ImageError::UnsupportedFormat { .. } => ErrorKind::ImageFormatUnsupported,
        };
        AppError::new(kind, e.to_string())
    }
}

/// The unique identifier printed on a physical tag, immutable and taken
/// from the route.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagCode(pub String);

impl TagCode {
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TagCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `Any` marks a generic physical tag whose concrete type is chosen by the
/// activator; the other three are concrete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagType {
    Item,
    Pet,
    Emergency,
    Any,
}

pub const CONCRETE_TAG_TYPES: &[TagType] = &[TagType::Item, TagType::Pet, TagType::Emergency];

impl TagType {
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "item" => Some(Self::Item),
            "pet" => Some(Self::Pet),
            "emergency" => Some(Self::Emergency),
            "any" => Some(Self::Any),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Item => "item",
            Self::Pet => "pet",
            Self::Emergency => "emergency",
            Self::Any => "any",
        }
    }

    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Item => "Item",
            Self::Pet => "Pet",
            Self::Emergency => "Emergency",
            Self::Any => "Any",
        }
    }

    #[must_use]
    pub const fn is_concrete(self) -> bool {
        !matches!(self, Self::Any)
    }
}

impl std::fmt::Display for TagType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItemDetails {
    pub name: String,
    pub category: String,
    pub color: String,
    pub brand: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PetDetails {
    pub name: String,
    pub breed: String,
    pub age: String,
    pub medical_notes: String,
    pub vet_name: String,
    pub vet_phone: String,
    pub emergency_name: String,
    pub emergency_phone: String,
    pub pedigree_number: String,
    pub breeder_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmergencyDetails {
    pub name: String,
    pub medical_aid: String,
    pub blood_type: String,
    pub allergies: String,
    pub medications: String,
    pub organ_donor: bool,
    pub ice_note: String,
    pub contact1_name: String,
    pub contact1_phone: String,
    pub contact1_relation: String,
    pub contact2_name: String,
    pub contact2_phone: String,
    pub contact2_relation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Exactly one detail shape is meaningful at a time, selected by the tag's
/// concrete type. The union makes cross-type field leakage unrepresentable:
/// switching type replaces the whole variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TagDetails {
    Item(ItemDetails),
    Pet(PetDetails),
    Emergency(EmergencyDetails),
}

impl TagDetails {
    /// A fresh, blank detail bag for the given type. `Any` falls back to
    /// the item shape, matching the default concrete selection.
    #[must_use]
    pub fn empty_for(tag_type: TagType) -> Self {
        match tag_type {
            TagType::Pet => Self::Pet(PetDetails::default()),
            TagType::Emergency => Self::Emergency(EmergencyDetails::default()),
            TagType::Item | TagType::Any => Self::Item(ItemDetails::default()),
        }
    }

    #[must_use]
    pub const fn tag_type(&self) -> TagType {
        match self {
            Self::Item(_) => TagType::Item,
            Self::Pet(_) => TagType::Pet,
            Self::Emergency(_) => TagType::Emergency,
        }
    }

    /// The item/pet/person name, the fourth required field of the form.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Item(d) => &d.name,
            Self::Pet(d) => &d.name,
            Self::Emergency(d) => &d.name,
        }
    }

    #[must_use]
    pub fn image(&self) -> Option<&str> {
        match self {
            Self::Item(d) => d.image.as_deref(),
            Self::Pet(d) => d.image.as_deref(),
            Self::Emergency(d) => d.image.as_deref(),
        }
    }

    pub fn image_mut(&mut self) -> &mut Option<String> {
        match self {
            Self::Item(d) => &mut d.image,
            Self::Pet(d) => &mut d.image,
            Self::Emergency(d) => &mut d.image,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContactInfo {
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TagSettings {
    pub instant_alerts: bool,
    pub location_sharing: bool,
    pub show_contact_on_finder_page: bool,
    pub use_backup_number: bool,
}

impl Default for TagSettings {
    fn default() -> Self {
        Self {
            instant_alerts: true,
            location_sharing: true,
            show_contact_on_finder_page: true,
            use_backup_number: false,
        }
    }
}

/// The server-owned tag record; this controller reads it and activates it,
/// never mutates it directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagRecord {
    pub code: TagCode,
    #[serde(rename = "type")]
    pub tag_type: TagType,
    pub is_activated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<ContactInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<TagDetails>,
    #[serde(default)]
    pub settings: TagSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationContact {
    pub name: String,
    pub email: String,
    /// International form: `+<calling code><national digits>`.
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_phone: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationRequest {
    #[serde(rename = "type")]
    pub tag_type: TagType,
    pub contact: ActivationContact,
    pub details: TagDetails,
    pub settings: TagSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationReceipt {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_password: Option<String>,
    pub user_email: String,
    #[serde(default)]
    pub is_new_user: bool,
}

/// The five mutually exclusive top-level views of the scan page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    #[default]
    Loading,
    LoadFailed,
    ActivationForm,
    FinderDisplay,
    Activated,
}

#[derive(Default)]
pub struct Model {
    pub scan_state: ScanState,
    pub tag_code: Option<TagCode>,
    /// Concrete type requested through the `?type=` query parameter,
    /// applied only if the fetched record turns out to be an "any" tag.
    pub requested_type: Option<TagType>,
    pub tag: Option<TagRecord>,
    pub form: Option<ActivationForm>,
    pub load_error: Option<AppError>,
    /// Top-of-form banner: validation, image, or submission failures.
    pub banner: Option<AppError>,
    pub focus: Option<FormField>,
    pub is_submitting: bool,
    pub receipt: Option<ActivationReceipt>,
    /// Snapshot of the payload that activated the tag, kept for the
    /// success summary after the live form is discarded.
    pub submitted: Option<ActivationRequest>,
}

impl Model {
    #[must_use]
    pub fn selected_tag_type(&self) -> Option<TagType> {
        self.form.as_ref().map(|f| f.selected_type)
    }

    #[must_use]
    pub fn stored_tag_type(&self) -> Option<TagType> {
        self.tag.as_ref().map(|t| t.tag_type)
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    /// Route mount: the tag code from the URL plus the raw `?type=` value.
    ScanStarted {
        code: String,
        requested_type: Option<String>,
    },
    TagFetched(Box<ApiResult>),
    RetryRequested,
    /// Completion of the fire-and-forget scan-tracking call. Observed for
    /// logging only; never touches the view.
    ScanTracked(Box<ApiResult>),

    TagTypeSelected(TagType),
    ContactEdited {
        field: ContactField,
        value: String,
    },
    DetailEdited {
        field: DetailField,
        value: String,
    },
    OrganDonorToggled,
    SectionToggled(Section),
    SettingToggled(Setting),
    MessageFocused,

    ImageSelected {
        mime_type: String,
        data: Vec<u8>,
    },
    ImageCleared,

    SubmitRequested,
    ActivationResponded(Box<ApiResult>),

    DismissError,
}

impl Event {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ScanStarted { .. } => "scan_started",
            Self::TagFetched(_) => "tag_fetched",
            Self::RetryRequested => "retry_requested",
            Self::ScanTracked(_) => "scan_tracked",
            Self::TagTypeSelected(_) => "tag_type_selected",
            Self::ContactEdited { .. } => "contact_edited",
            Self::DetailEdited { .. } => "detail_edited",
            Self::OrganDonorToggled => "organ_donor_toggled",
            Self::SectionToggled(_) => "section_toggled",
            Self::SettingToggled(_) => "setting_toggled",
            Self::MessageFocused => "message_focused",
            Self::ImageSelected { .. } => "image_selected",
            Self::ImageCleared => "image_cleared",
            Self::SubmitRequested => "submit_requested",
            Self::ActivationResponded(_) => "activation_responded",
            Self::DismissError => "dismiss_error",
        }
    }

    #[must_use]
    pub const fn is_user_initiated(&self) -> bool {
        matches!(
            self,
            Self::RetryRequested
                | Self::TagTypeSelected(_)
                | Self::ContactEdited { .. }
                | Self::DetailEdited { .. }
                | Self::OrganDonorToggled
                | Self::SectionToggled(_)
                | Self::SettingToggled(_)
                | Self::MessageFocused
                | Self::ImageSelected { .. }
                | Self::ImageCleared
                | Self::SubmitRequested
                | Self::DismissError
        )
    }
}

// --- Finder contact actions ---------------------------------------------
//
// Browser-native URI scheme invocations, constructed here so every shell
// renders identical links. The wa.me link is a regular https URL and uses
// form-urlencoding for its query; mailto:/sms: follow RFC 6068-style
// percent-encoding, where '+' must not stand for a space.

const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[must_use]
pub fn whatsapp_link(phone: &str, text: &str) -> String {
    let digits = validate::digits_of(phone);
    let query: String = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("text", text)
        .finish();
    format!("https://wa.me/{digits}?{query}")
}

#[must_use]
pub fn tel_link(phone: &str) -> String {
    format!("tel:{phone}")
}

#[must_use]
pub fn mailto_link(email: &str, subject: &str, body: &str) -> String {
    format!(
        "mailto:{email}?subject={}&body={}",
        utf8_percent_encode(subject, URI_COMPONENT),
        utf8_percent_encode(body, URI_COMPONENT)
    )
}

#[must_use]
pub fn sms_link(phone: &str, body: &str) -> String {
    format!("sms:{phone}?body={}", utf8_percent_encode(body, URI_COMPONENT))
}

// --- View model ---------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserFacingError {
    pub message: String,
    pub error_code: String,
    pub is_retryable: bool,
}

impl From<&AppError> for UserFacingError {
    fn from(e: &AppError) -> Self {
        Self {
            message: e.user_facing_message(),
            error_code: e.code().to_string(),
            is_retryable: e.is_retryable(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormView {
    pub code: String,
    pub stored_type: TagType,
    pub selected_type: TagType,
    /// One entry for pre-typed tags; all three concrete types for "any".
    pub type_choices: Vec<TagType>,
    pub contact: ContactForm,
    pub details: TagDetails,
    pub settings: TagSettings,
    pub sections: SectionFlags,
    pub email_error: String,
    pub age_error: String,
    pub phone_errors: PhoneErrors,
    pub focus: Option<FormField>,
    pub can_submit: bool,
    pub is_submitting: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerContactView {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub backup_phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactActions {
    pub whatsapp_url: String,
    pub call_url: String,
    pub email_url: String,
    pub sms_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinderView {
    pub code: String,
    pub tag_type: TagType,
    /// The owner's free-text note to finders, when one was left.
    pub message: Option<String>,
    pub show_contact: bool,
    /// Present only when the owner chose to show contact details on the
    /// public page; the action buttons below work either way.
    pub owner: Option<OwnerContactView>,
    pub actions: Option<ContactActions>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialsNotice {
    NewAccount {
        email: String,
        temp_password: String,
    },
    ExistingAccount {
        email: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessView {
    pub code: String,
    pub tag_type: TagType,
    pub owner_name: String,
    pub credentials: CredentialsNotice,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewState {
    Loading,
    LoadFailed { message: String, can_retry: bool },
    ActivationForm(Box<FormView>),
    FinderDisplay(Box<FinderView>),
    Activated(Box<SuccessView>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewModel {
    pub state: ViewState,
    pub banner: Option<UserFacingError>,
}

pub mod app {
    use super::*;
    use crate::capabilities::Capabilities;
    use crate::form::accept_image;

    #[derive(Default)]
    pub struct App;

    impl App {
        fn fetch_tag(code: &TagCode, caps: &Capabilities) {
            caps.api
                .fetch_tag(code.clone(), |result| Event::TagFetched(Box::new(result)));
        }

        /// Concrete type the form opens with. A valid `?type=` parameter
        /// takes precedence for "any" tags; otherwise "any" defaults to
        /// item and pre-typed tags use their stored type.
        fn seed_selected_type(record: &TagRecord, requested: Option<TagType>) -> TagType {
            if record.tag_type == TagType::Any {
                requested
                    .filter(|t| t.is_concrete())
                    .unwrap_or(TagType::Item)
            } else {
                record.tag_type
            }
        }

        /// Fixed precedence: timeout-class beats "inactive" beats the
        /// generic failure message. The backend exposes no structured
        /// codes, so this matches on message text where it has to.
        fn classify_load_failure(error: &ApiError) -> AppError {
            let message = error.message();
            let lowered = message.to_lowercase();
            if matches!(error, ApiError::Timeout) || lowered.contains("timeout") {
                return AppError::new(ErrorKind::Timeout, message);
            }
            if error.status_code() == Some(403) || lowered.contains("inactive") {
                return AppError::new(ErrorKind::TagInactive, message);
            }
            if error.status_code() == Some(404) {
                return AppError::new(ErrorKind::NotFound, message);
            }
            match error {
                ApiError::Network { .. } => AppError::new(ErrorKind::Network, message),
                _ => AppError::new(ErrorKind::Unknown, message),
            }
        }

        fn handle_tag_fetched(result: ApiResult, model: &mut Model, caps: &Capabilities) {
            match result {
                Ok(ApiOutput::Tag(record)) => {
                    let record = *record;
                    if record.is_activated {
                        model.scan_state = ScanState::FinderDisplay;
                        // Best-effort analytics; the result event only logs.
                        caps.api.track_scan(record.code.clone(), |result| {
                            Event::ScanTracked(Box::new(result))
                        });
                    } else {
                        let selected = Self::seed_selected_type(&record, model.requested_type);
                        model.form = Some(ActivationForm::new(selected));
                        model.scan_state = ScanState::ActivationForm;
                    }
                    model.load_error = None;
                    model.tag = Some(record);
                }
                Ok(other) => {
                    tracing::warn!(output = ?other, "unexpected API output for tag fetch");
                    model.load_error =
                        Some(AppError::new(ErrorKind::Internal, "unexpected API output"));
                    model.scan_state = ScanState::LoadFailed;
                }
                Err(error) => {
                    model.load_error = Some(Self::classify_load_failure(&error));
                    model.scan_state = ScanState::LoadFailed;
                }
            }
        }

        fn handle_submit(model: &mut Model, caps: &Capabilities) {
            if model.is_submitting {
                return;
            }
            let (Some(form), Some(code)) = (model.form.as_ref(), model.tag_code.clone()) else {
                return;
            };

            if !form.is_form_valid() {
                let message = if form.required_fields_missing() {
                    REQUIRED_FIELDS_BANNER
                } else {
                    VALIDATION_BANNER
                };
                model.banner = Some(AppError::new(ErrorKind::Validation, message));
                model.focus = form.first_invalid_field();
                return;
            }

            // Submit-time guard over the section phone errors, independent
            // of the button's enabled-state predicate. Both gates block.
            if !form.visible_section_errors_clear() {
                model.banner = Some(AppError::new(ErrorKind::Validation, VALIDATION_BANNER));
                model.focus = form.first_invalid_field();
                return;
            }

            let payload = form.build_payload();
            model.banner = None;
            model.focus = None;
            model.is_submitting = true;
            caps.api.activate(code, payload, |result| {
                Event::ActivationResponded(Box::new(result))
            });
        }

        fn handle_activation_response(result: ApiResult, model: &mut Model) {
            model.is_submitting = false;
            match result {
                Ok(ApiOutput::Activated(receipt)) => {
                    // The live form is discarded for a read-only snapshot.
                    model.submitted = model.form.take().map(|f| f.build_payload());
                    model.receipt = Some(*receipt);
                    model.banner = None;
                    model.focus = None;
                    model.scan_state = ScanState::Activated;
                    if let Some(tag) = model.tag.as_mut() {
                        tag.is_activated = true;
                        if let Some(request) = model.submitted.as_ref() {
                            tag.tag_type = request.tag_type;
                        }
                    }
                }
                Ok(other) => {
                    tracing::warn!(output = ?other, "unexpected API output for activation");
                    model.banner = Some(AppError::new(
                        ErrorKind::Submission,
                        SUBMIT_FALLBACK_MESSAGE,
                    ));
                }
                Err(error) => {
                    let message = error.message();
                    let message = if message.is_empty() {
                        SUBMIT_FALLBACK_MESSAGE.to_string()
                    } else {
                        message
                    };
                    model.banner = Some(AppError::new(ErrorKind::Submission, message));
                }
            }
        }

        fn build_form_view(record: &TagRecord, form: &ActivationForm, model: &Model) -> FormView {
            let type_choices = if record.tag_type == TagType::Any {
                CONCRETE_TAG_TYPES.to_vec()
            } else {
                vec![record.tag_type]
            };
            FormView {
                code: record.code.to_string(),
                stored_type: record.tag_type,
                selected_type: form.selected_type,
                type_choices,
                contact: form.contact.clone(),
                details: form.details.clone(),
                settings: form.settings,
                sections: form.sections,
                email_error: form.email_error.clone(),
                age_error: form.age_error.clone(),
                phone_errors: form.phone_errors.clone(),
                focus: model.focus,
                can_submit: form.is_form_valid() && !model.is_submitting,
                is_submitting: model.is_submitting,
            }
        }

        /// Prefilled text a finder sends to the owner.
        fn finder_greeting(record: &TagRecord) -> String {
            let code = &record.code;
            match record.tag_type {
                TagType::Pet => format!(
                    "Hi! I found your pet and scanned their ScanBack tag ({code}). \
                     Let me know how to get them back to you."
                ),
                TagType::Emergency => format!(
                    "Hi, I scanned a ScanBack emergency tag ({code}) and I'm with its \
                     holder. Please get in touch."
                ),
                TagType::Item | TagType::Any => format!(
                    "Hi! I found your item and scanned its ScanBack tag ({code}). \
                     Let me know how to get it back to you."
                ),
            }
        }

        fn build_finder_view(record: &TagRecord) -> FinderView {
            let show_contact = record.settings.show_contact_on_finder_page;
            let greeting = Self::finder_greeting(record);
            let subject = format!("Your ScanBack tag {}", record.code);

            let actions = record.contact.as_ref().map(|c| ContactActions {
                whatsapp_url: whatsapp_link(&c.phone, &greeting),
                call_url: tel_link(&c.phone),
                email_url: mailto_link(&c.email, &subject, &greeting),
                sms_url: sms_link(&c.phone, &greeting),
            });

            let owner = record.contact.as_ref().filter(|_| show_contact).map(|c| {
                OwnerContactView {
                    name: c.name.clone(),
                    email: c.email.clone(),
                    phone: c.phone.clone(),
                    backup_phone: if record.settings.use_backup_number {
                        c.backup_phone.clone()
                    } else {
                        None
                    },
                }
            });

            FinderView {
                code: record.code.to_string(),
                tag_type: record.tag_type,
                message: record
                    .contact
                    .as_ref()
                    .and_then(|c| c.message.clone())
                    .filter(|m| !m.trim().is_empty()),
                show_contact,
                owner,
                actions,
            }
        }

        fn build_success_view(model: &Model) -> Option<SuccessView> {
            let receipt = model.receipt.as_ref()?;
            let submitted = model.submitted.as_ref()?;
            let credentials = match &receipt.temp_password {
                Some(password) if receipt.is_new_user => CredentialsNotice::NewAccount {
                    email: receipt.user_email.clone(),
                    temp_password: password.clone(),
                },
                _ => CredentialsNotice::ExistingAccount {
                    email: receipt.user_email.clone(),
                },
            };
            Some(SuccessView {
                code: model
                    .tag_code
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
                tag_type: submitted.tag_type,
                owner_name: submitted.contact.name.clone(),
                credentials,
            })
        }
    }

    impl crux_core::App for App {
        type Event = Event;
        type Model = Model;
        type ViewModel = ViewModel;
        type Capabilities = Capabilities;

        fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
            let event_name = event.name();
            if event.is_user_initiated() {
                tracing::debug!(event = event_name, "user action");
            } else {
                tracing::debug!(event = event_name, "scan page event");
            }

            match event {
                Event::ScanStarted {
                    code,
                    requested_type,
                } => {
                    // Fresh session per route mount; nothing survives a
                    // re-scan, including a previously selected type.
                    *model = Model::default();
                    model.requested_type = requested_type
                        .as_deref()
                        .and_then(TagType::from_str)
                        .filter(|t| t.is_concrete());
                    let code = TagCode::new(code);
                    Self::fetch_tag(&code, caps);
                    model.tag_code = Some(code);
                    caps.render.render();
                }

                Event::TagFetched(result) => {
                    Self::handle_tag_fetched(*result, model, caps);
                    caps.render.render();
                }

                Event::RetryRequested => {
                    let retryable = model
                        .load_error
                        .as_ref()
                        .is_some_and(AppError::is_retryable);
                    if model.scan_state == ScanState::LoadFailed && retryable {
                        if let Some(code) = model.tag_code.clone() {
                            model.load_error = None;
                            model.scan_state = ScanState::Loading;
                            Self::fetch_tag(&code, caps);
                            caps.render.render();
                        }
                    }
                }

                Event::ScanTracked(result) => {
                    // Completion of the detached analytics task. Failures
                    // are logged and never reach the view.
                    if let Err(error) = *result {
                        tracing::warn!(%error, "scan tracking failed; ignoring");
                    }
                }

                Event::TagTypeSelected(tag_type) => {
                    let stored_any = model.stored_tag_type() == Some(TagType::Any);
                    if stored_any {
                        if let Some(form) = model.form.as_mut() {
                            form.switch_type(tag_type);
                            caps.render.render();
                        }
                    } else {
                        tracing::debug!(
                            requested = tag_type.as_str(),
                            "type selection ignored for pre-typed tag"
                        );
                    }
                }

                Event::ContactEdited { field, value } => {
                    if let Some(form) = model.form.as_mut() {
                        form.set_contact_field(field, value);
                        caps.render.render();
                    }
                }

                Event::DetailEdited { field, value } => {
                    if let Some(form) = model.form.as_mut() {
                        if !form.set_detail_field(field, value) {
                            tracing::debug!(
                                field = ?field,
                                "detail edit dropped; field not in selected type"
                            );
                        }
                        caps.render.render();
                    }
                }

                Event::OrganDonorToggled => {
                    if let Some(form) = model.form.as_mut() {
                        if let TagDetails::Emergency(d) = &mut form.details {
                            d.organ_donor = !d.organ_donor;
                            caps.render.render();
                        }
                    }
                }

                Event::SectionToggled(section) => {
                    if let Some(form) = model.form.as_mut() {
                        form.toggle_section(section);
                        caps.render.render();
                    }
                }

                Event::SettingToggled(setting) => {
                    if let Some(form) = model.form.as_mut() {
                        form.toggle_setting(setting);
                        caps.render.render();
                    }
                }

                Event::MessageFocused => {
                    if let Some(form) = model.form.as_mut() {
                        form.focus_message();
                        caps.render.render();
                    }
                }

                Event::ImageSelected { mime_type, data } => {
                    if let Some(form) = model.form.as_mut() {
                        match accept_image(&mime_type, &data) {
                            Ok(data_url) => {
                                form.set_image(data_url);
                                model.banner = None;
                            }
                            Err(error) => {
                                // Upload aborted; no partial state kept.
                                model.banner = Some(error.into());
                            }
                        }
                        caps.render.render();
                    }
                }

                Event::ImageCleared => {
                    if let Some(form) = model.form.as_mut() {
                        form.clear_image();
                        caps.render.render();
                    }
                }

                Event::SubmitRequested => {
                    Self::handle_submit(model, caps);
                    caps.render.render();
                }

                Event::ActivationResponded(result) => {
                    Self::handle_activation_response(*result, model);
                    caps.render.render();
                }

                Event::DismissError => {
                    model.banner = None;
                    caps.render.render();
                }
            }
        }

        fn view(&self, model: &Model) -> ViewModel {
            let state = match model.scan_state {
                ScanState::Loading => ViewState::Loading,

                ScanState::LoadFailed => {
                    let (message, can_retry) = model
                        .load_error
                        .as_ref()
                        .map_or((LOAD_FALLBACK_MESSAGE.to_string(), false), |e| {
                            (e.user_facing_message(), e.is_retryable())
                        });
                    ViewState::LoadFailed { message, can_retry }
                }

                ScanState::ActivationForm => match (&model.tag, &model.form) {
                    (Some(record), Some(form)) => ViewState::ActivationForm(Box::new(
                        Self::build_form_view(record, form, model),
                    )),
                    _ => ViewState::Loading,
                },

                ScanState::FinderDisplay => match &model.tag {
                    Some(record) => {
                        ViewState::FinderDisplay(Box::new(Self::build_finder_view(record)))
                    }
                    None => ViewState::Loading,
                },

                ScanState::Activated => match Self::build_success_view(model) {
                    Some(success) => ViewState::Activated(Box::new(success)),
                    None => ViewState::Loading,
                },
            };

            ViewModel {
                state,
                banner: model.banner.as_ref().map(UserFacingError::from),
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn record(tag_type: TagType, is_activated: bool) -> TagRecord {
            TagRecord {
                code: TagCode::new("SB-TEST01"),
                tag_type,
                is_activated,
                contact: None,
                details: None,
                settings: TagSettings::default(),
            }
        }

        mod seed_tests {
            use super::*;

            #[test]
            fn test_pre_typed_tag_uses_stored_type() {
                let r = record(TagType::Pet, false);
                assert_eq!(App::seed_selected_type(&r, None), TagType::Pet);
                assert_eq!(
                    App::seed_selected_type(&r, Some(TagType::Emergency)),
                    TagType::Pet
                );
            }

            #[test]
            fn test_any_tag_defaults_to_item() {
                let r = record(TagType::Any, false);
                assert_eq!(App::seed_selected_type(&r, None), TagType::Item);
            }

            #[test]
            fn test_any_tag_honours_requested_type() {
                let r = record(TagType::Any, false);
                assert_eq!(
                    App::seed_selected_type(&r, Some(TagType::Emergency)),
                    TagType::Emergency
                );
            }

            #[test]
            fn test_requested_any_is_not_concrete() {
                let r = record(TagType::Any, false);
                assert_eq!(App::seed_selected_type(&r, Some(TagType::Any)), TagType::Item);
            }
        }

        mod classify_tests {
            use super::*;

            #[test]
            fn test_timeout_variant_is_timeout_class() {
                let e = App::classify_load_failure(&ApiError::Timeout);
                assert_eq!(e.kind, ErrorKind::Timeout);
                assert!(e.is_retryable());
            }

            #[test]
            fn test_timeout_message_beats_inactive() {
                let e = App::classify_load_failure(&ApiError::Status {
                    code: 403,
                    message: "Request timeout while checking inactive tag".into(),
                });
                assert_eq!(e.kind, ErrorKind::Timeout);
            }

            #[test]
            fn test_403_is_inactive() {
                let e = App::classify_load_failure(&ApiError::Status {
                    code: 403,
                    message: "forbidden".into(),
                });
                assert_eq!(e.kind, ErrorKind::TagInactive);
                assert!(!e.is_retryable());
            }

            #[test]
            fn test_inactive_message_without_status() {
                let e = App::classify_load_failure(&ApiError::Network {
                    message: "QR code is inactive".into(),
                });
                assert_eq!(e.kind, ErrorKind::TagInactive);
            }

            #[test]
            fn test_404_is_not_found() {
                let e = App::classify_load_failure(&ApiError::Status {
                    code: 404,
                    message: "no such tag".into(),
                });
                assert_eq!(e.kind, ErrorKind::NotFound);
            }

            #[test]
            fn test_generic_keeps_server_message() {
                let e = App::classify_load_failure(&ApiError::Status {
                    code: 500,
                    message: "database exploded".into(),
                });
                assert_eq!(e.kind, ErrorKind::Unknown);
                assert_eq!(e.user_facing_message(), "database exploded");
            }
        }

        mod finder_view_tests {
            use super::*;

            fn activated_record(show_contact: bool) -> TagRecord {
                let mut r = record(TagType::Pet, true);
                r.contact = Some(ContactInfo {
                    name: "Thandi".into(),
                    email: "thandi@example.com".into(),
                    phone: "+27821234567".into(),
                    backup_phone: Some("+27835550100".into()),
                    message: Some("Luna is microchipped.".into()),
                });
                r.settings.show_contact_on_finder_page = show_contact;
                r
            }

            #[test]
            fn test_actions_present_without_owner_block() {
                let view = App::build_finder_view(&activated_record(false));
                assert!(view.actions.is_some());
                assert!(view.owner.is_none());
                assert!(!view.show_contact);
            }

            #[test]
            fn test_owner_block_when_enabled() {
                let view = App::build_finder_view(&activated_record(true));
                let owner = view.owner.expect("owner block shown");
                assert_eq!(owner.name, "Thandi");
                // Backup number stays hidden until explicitly enabled.
                assert_eq!(owner.backup_phone, None);
            }

            #[test]
            fn test_backup_number_surfaced_when_enabled() {
                let mut r = activated_record(true);
                r.settings.use_backup_number = true;
                let view = App::build_finder_view(&r);
                assert_eq!(
                    view.owner.expect("owner block").backup_phone,
                    Some("+27835550100".into())
                );
            }

            #[test]
            fn test_whatsapp_link_uses_digits_only() {
                let view = App::build_finder_view(&activated_record(true));
                let actions = view.actions.expect("actions");
                assert!(actions.whatsapp_url.starts_with("https://wa.me/27821234567?text="));
                assert_eq!(actions.call_url, "tel:+27821234567");
                assert!(actions.email_url.starts_with("mailto:thandi@example.com?subject="));
                assert!(actions.sms_url.starts_with("sms:+27821234567?body="));
            }

            #[test]
            fn test_blank_owner_message_is_dropped() {
                let mut r = activated_record(true);
                if let Some(c) = r.contact.as_mut() {
                    c.message = Some("   ".into());
                }
                let view = App::build_finder_view(&r);
                assert_eq!(view.message, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod tag_type_tests {
        use super::*;

        #[test]
        fn test_from_str() {
            assert_eq!(TagType::from_str("item"), Some(TagType::Item));
            assert_eq!(TagType::from_str("PET"), Some(TagType::Pet));
            assert_eq!(TagType::from_str(" emergency "), Some(TagType::Emergency));
            assert_eq!(TagType::from_str("any"), Some(TagType::Any));
            assert_eq!(TagType::from_str("vehicle"), None);
            assert_eq!(TagType::from_str(""), None);
        }

        #[test]
        fn test_concreteness() {
            assert!(TagType::Item.is_concrete());
            assert!(TagType::Pet.is_concrete());
            assert!(TagType::Emergency.is_concrete());
            assert!(!TagType::Any.is_concrete());
        }

        #[test]
        fn test_concrete_choices_exclude_any() {
            assert!(!CONCRETE_TAG_TYPES.contains(&TagType::Any));
            assert_eq!(CONCRETE_TAG_TYPES.len(), 3);
        }
    }

    mod details_tests {
        use super::*;

        #[test]
        fn test_empty_for_matches_type() {
            assert_eq!(TagDetails::empty_for(TagType::Item).tag_type(), TagType::Item);
            assert_eq!(TagDetails::empty_for(TagType::Pet).tag_type(), TagType::Pet);
            assert_eq!(
                TagDetails::empty_for(TagType::Emergency).tag_type(),
                TagType::Emergency
            );
            assert_eq!(TagDetails::empty_for(TagType::Any).tag_type(), TagType::Item);
        }

        #[test]
        fn test_image_slot_accessors() {
            let mut details = TagDetails::empty_for(TagType::Pet);
            assert!(details.image().is_none());
            *details.image_mut() = Some("data:image/png;base64,AAAA".into());
            assert_eq!(details.image(), Some("data:image/png;base64,AAAA"));
        }

        #[test]
        fn test_wire_shape_is_kind_tagged() {
            let details = TagDetails::Pet(PetDetails {
                name: "Luna".into(),
                ..PetDetails::default()
            });
            let json = serde_json::to_value(&details).unwrap();
            assert_eq!(json["kind"], "pet");
            assert_eq!(json["name"], "Luna");
        }
    }

    mod error_tests {
        use super::*;

        #[test]
        fn test_retry_is_timeout_only() {
            assert!(AppError::new(ErrorKind::Timeout, "x").is_retryable());
            assert!(!AppError::new(ErrorKind::Network, "x").is_retryable());
            assert!(!AppError::new(ErrorKind::TagInactive, "x").is_retryable());
        }

        #[test]
        fn test_user_facing_messages() {
            assert_eq!(
                AppError::new(ErrorKind::Timeout, "raw").user_facing_message(),
                TIMEOUT_MESSAGE
            );
            assert_eq!(
                AppError::new(ErrorKind::TagInactive, "raw").user_facing_message(),
                INACTIVE_TAG_MESSAGE
            );
            assert_eq!(
                AppError::new(ErrorKind::Unknown, "server said no").user_facing_message(),
                "server said no"
            );
            assert_eq!(
                AppError::new(ErrorKind::Unknown, "").user_facing_message(),
                LOAD_FALLBACK_MESSAGE
            );
        }

        #[test]
        fn test_image_error_mapping() {
            let e: AppError = ImageError::TooLarge {
                size: 6 * 1024 * 1024,
                max: MAX_IMAGE_BYTES,
            }
            .into();
            assert_eq!(e.kind, ErrorKind::ImageTooLarge);
            assert!(e.user_facing_message().contains("5 MB"));
        }
    }

    mod link_tests {
        use super::*;

        #[test]
        fn test_whatsapp_link_strips_non_digits() {
            let link = whatsapp_link("+27 82 123-4567", "hello there");
            assert!(link.starts_with("https://wa.me/27821234567?text=hello"));
        }

        #[test]
        fn test_mailto_percent_encodes_spaces() {
            let link = mailto_link("a@b.co", "Found it", "hi there");
            assert_eq!(link, "mailto:a@b.co?subject=Found%20it&body=hi%20there");
        }

        #[test]
        fn test_sms_link_shape() {
            let link = sms_link("+27821234567", "hi");
            assert_eq!(link, "sms:+27821234567?body=hi");
        }

        #[test]
        fn test_tel_link_keeps_plus() {
            assert_eq!(tel_link("+27821234567"), "tel:+27821234567");
        }

        #[test]
        fn test_links_are_pure() {
            let a = whatsapp_link("+27821234567", "x y");
            let b = whatsapp_link("+27821234567", "x y");
            assert_eq!(a, b);
        }
    }

    mod view_state_tests {
        use super::*;

        #[test]
        fn test_view_state_serializes_tagged() {
            let state = ViewState::LoadFailed {
                message: "x".into(),
                can_retry: true,
            };
            let json = serde_json::to_value(&state).unwrap();
            assert_eq!(json["type"], "load_failed");
            assert_eq!(json["can_retry"], true);
        }

        #[test]
        fn test_settings_defaults() {
            let settings = TagSettings::default();
            assert!(settings.instant_alerts);
            assert!(settings.location_sharing);
            assert!(settings.show_contact_on_finder_page);
            assert!(!settings.use_backup_number);
        }
    }
}
