//! Client-owned state for one activation session.
//!
//! `ActivationForm` mirrors the contact / details / settings shapes of the
//! submission payload, tracks per-field validation state, and owns the
//! clearing pass that runs when the concrete type of an "any" tag changes.
//! It lives from the moment the activation form is shown until a submission
//! succeeds, at which point it is discarded in favour of a read-only
//! success snapshot.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

use crate::validate::{
    compose_phone, is_known_country, validate_age, validate_email, validate_phone,
};
use crate::{
    ActivationContact, ActivationRequest, ImageError, TagDetails, TagSettings, TagType,
    DEFAULT_COUNTRY, MAX_IMAGE_BYTES,
};

pub const ACCEPTED_IMAGE_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp"];

/// Validates a selected image and converts it to an inline data URL.
/// The declared MIME type is checked first, then the actual bytes are
/// sniffed; a mismatch between the two is resolved in favour of the bytes.
pub fn accept_image(mime_type: &str, data: &[u8]) -> Result<String, ImageError> {
    if !ACCEPTED_IMAGE_MIME_TYPES.contains(&mime_type) {
        return Err(ImageError::UnsupportedFormat {
            mime_type: mime_type.to_string(),
        });
    }
    if data.len() > MAX_IMAGE_BYTES {
        return Err(ImageError::TooLarge {
            size: data.len(),
            max: MAX_IMAGE_BYTES,
        });
    }
    let format = image::guess_format(data).map_err(|_| ImageError::UnsupportedFormat {
        mime_type: mime_type.to_string(),
    })?;
    let sniffed = match format {
        image::ImageFormat::Jpeg => "image/jpeg",
        image::ImageFormat::Png => "image/png",
        image::ImageFormat::WebP => "image/webp",
        _ => {
            return Err(ImageError::UnsupportedFormat {
                mime_type: mime_type.to_string(),
            })
        }
    };
    Ok(format!("data:{sniffed};base64,{}", BASE64.encode(data)))
}

/// The finder-message template. Emergency tags get a fixed text; item and
/// pet templates interpolate the details name, falling back to a nameless
/// variant when the name is still blank.
#[must_use]
pub fn default_finder_message(tag_type: TagType, name: &str) -> String {
    let name = name.trim();
    match tag_type {
        TagType::Emergency => {
            "You've scanned my emergency tag. Please contact one of the numbers listed \
             here to reach someone who can help me. Thank you!"
                .to_string()
        }
        TagType::Pet => {
            if name.is_empty() {
                "Hi! You've found my pet. Please contact me so I can come fetch them. \
                 Thank you so much!"
                    .to_string()
            } else {
                format!(
                    "Hi! You've found {name}. Please contact me so I can come fetch them. \
                     Thank you so much!"
                )
            }
        }
        TagType::Item | TagType::Any => {
            if name.is_empty() {
                "Hi! You've found my item. Please contact me so we can arrange its return. \
                 Thank you!"
                    .to_string()
            } else {
                format!(
                    "Hi! You've found my {name}. Please contact me so we can arrange its \
                     return. Thank you!"
                )
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactForm {
    pub name: String,
    pub email: String,
    /// Raw national number as typed; composed with the country calling code
    /// only when the payload is built.
    pub phone: String,
    pub backup_phone: String,
    pub country: String,
    pub message: String,
    /// False until the finder-message field is first focused. While true,
    /// name and type changes regenerate the template over any manual edits.
    pub message_clicked: bool,
}

impl Default for ContactForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            email: String::new(),
            phone: String::new(),
            backup_phone: String::new(),
            country: DEFAULT_COUNTRY.to_string(),
            message: String::new(),
            message_clicked: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SectionFlags {
    pub emergency_details: bool,
    pub pedigree_info: bool,
    pub emergency_medical_details: bool,
    pub emergency_contacts: bool,
}

impl SectionFlags {
    pub fn collapse(&mut self) {
        *self = Self::default();
    }
}

/// One error string per phone-bearing field, each independently validated.
/// Empty string means valid.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PhoneErrors {
    pub main: String,
    pub backup: String,
    pub vet: String,
    pub emergency: String,
    pub emergency_contact1: String,
    pub emergency_contact2: String,
}

impl PhoneErrors {
    #[must_use]
    pub fn main_and_backup_clear(&self) -> bool {
        self.main.is_empty() && self.backup.is_empty()
    }

    pub fn clear_section_fields(&mut self) {
        self.vet.clear();
        self.emergency.clear();
        self.emergency_contact1.clear();
        self.emergency_contact2.clear();
    }
}

/// Focusable fields, in the fixed priority order used when a submission is
/// blocked by validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormField {
    ContactName,
    Email,
    Phone,
    BackupPhone,
    DetailsName,
    Age,
    VetPhone,
    EmergencyPhone,
    EmergencyContact1Phone,
    EmergencyContact2Phone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactField {
    Name,
    Email,
    Phone,
    BackupPhone,
    Country,
    Message,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailField {
    Name,
    Category,
    Color,
    Brand,
    Model,
    Breed,
    Age,
    MedicalNotes,
    VetName,
    VetPhone,
    EmergencyName,
    EmergencyPhone,
    PedigreeNumber,
    BreederName,
    MedicalAid,
    BloodType,
    Allergies,
    Medications,
    IceNote,
    Contact1Name,
    Contact1Phone,
    Contact1Relation,
    Contact2Name,
    Contact2Phone,
    Contact2Relation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    EmergencyDetails,
    PedigreeInfo,
    EmergencyMedicalDetails,
    EmergencyContacts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Setting {
    InstantAlerts,
    LocationSharing,
    ShowContactOnFinderPage,
    UseBackupNumber,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationForm {
    /// The concrete type this session is activating as. For "any" tags this
    /// is the locally-selected type; for pre-typed tags it equals the
    /// stored type and never changes.
    pub selected_type: TagType,
    pub contact: ContactForm,
    pub details: TagDetails,
    pub settings: TagSettings,
    pub sections: SectionFlags,
    pub email_error: String,
    pub age_error: String,
    pub phone_errors: PhoneErrors,
}

impl ActivationForm {
    #[must_use]
    pub fn new(selected_type: TagType) -> Self {
        Self {
            selected_type,
            contact: ContactForm::default(),
            details: TagDetails::empty_for(selected_type),
            settings: TagSettings::default(),
            sections: SectionFlags::default(),
            email_error: String::new(),
            age_error: String::new(),
            phone_errors: PhoneErrors::default(),
        }
    }

    pub fn set_contact_field(&mut self, field: ContactField, value: String) {
        match field {
            ContactField::Name => self.contact.name = value,
            ContactField::Email => {
                self.email_error = validate_email(value.trim());
                self.contact.email = value;
            }
            ContactField::Phone => {
                self.phone_errors.main = validate_phone(&value);
                self.contact.phone = value;
            }
            ContactField::BackupPhone => {
                self.phone_errors.backup = validate_phone(&value);
                self.contact.backup_phone = value;
            }
            ContactField::Country => {
                if is_known_country(&value) {
                    self.contact.country = value.trim().to_uppercase();
                } else {
                    tracing::debug!(country = %value, "ignoring unknown country selection");
                }
            }
            ContactField::Message => self.contact.message = value,
        }
    }

    /// Returns false when the field does not belong to the currently
    /// selected type's detail shape (the edit is dropped).
    pub fn set_detail_field(&mut self, field: DetailField, value: String) -> bool {
        let applied = match (&mut self.details, field) {
            (TagDetails::Item(d), DetailField::Name) => {
                d.name = value;
                true
            }
            (TagDetails::Item(d), DetailField::Category) => {
                d.category = value;
                true
            }
            (TagDetails::Item(d), DetailField::Color) => {
                d.color = value;
                true
            }
            (TagDetails::Item(d), DetailField::Brand) => {
                d.brand = value;
                true
            }
            (TagDetails::Item(d), DetailField::Model) => {
                d.model = value;
                true
            }
            (TagDetails::Pet(d), DetailField::Name) => {
                d.name = value;
                true
            }
            (TagDetails::Pet(d), DetailField::Breed) => {
                d.breed = value;
                true
            }
            (TagDetails::Pet(d), DetailField::Age) => {
                self.age_error = validate_age(&value);
                d.age = value;
                true
            }
            (TagDetails::Pet(d), DetailField::MedicalNotes) => {
                d.medical_notes = value;
                true
            }
            (TagDetails::Pet(d), DetailField::VetName) => {
                d.vet_name = value;
                true
            }
            (TagDetails::Pet(d), DetailField::VetPhone) => {
                self.phone_errors.vet = validate_phone(&value);
                d.vet_phone = value;
                true
            }
            (TagDetails::Pet(d), DetailField::EmergencyName) => {
                d.emergency_name = value;
                true
            }
            (TagDetails::Pet(d), DetailField::EmergencyPhone) => {
                self.phone_errors.emergency = validate_phone(&value);
                d.emergency_phone = value;
                true
            }
            (TagDetails::Pet(d), DetailField::PedigreeNumber) => {
                d.pedigree_number = value;
                true
            }
            (TagDetails::Pet(d), DetailField::BreederName) => {
                d.breeder_name = value;
                true
            }
            (TagDetails::Emergency(d), DetailField::Name) => {
                d.name = value;
                true
            }
            (TagDetails::Emergency(d), DetailField::MedicalAid) => {
                d.medical_aid = value;
                true
            }
            (TagDetails::Emergency(d), DetailField::BloodType) => {
                d.blood_type = value;
                true
            }
            (TagDetails::Emergency(d), DetailField::Allergies) => {
                d.allergies = value;
                true
            }
            (TagDetails::Emergency(d), DetailField::Medications) => {
                d.medications = value;
                true
            }
            (TagDetails::Emergency(d), DetailField::IceNote) => {
                d.ice_note = value;
                true
            }
            (TagDetails::Emergency(d), DetailField::Contact1Name) => {
                d.contact1_name = value;
                true
            }
            (TagDetails::Emergency(d), DetailField::Contact1Phone) => {
                self.phone_errors.emergency_contact1 = validate_phone(&value);
                d.contact1_phone = value;
                true
            }
            (TagDetails::Emergency(d), DetailField::Contact1Relation) => {
                d.contact1_relation = value;
                true
            }
            (TagDetails::Emergency(d), DetailField::Contact2Name) => {
                d.contact2_name = value;
                true
            }
            (TagDetails::Emergency(d), DetailField::Contact2Phone) => {
                self.phone_errors.emergency_contact2 = validate_phone(&value);
                d.contact2_phone = value;
                true
            }
            (TagDetails::Emergency(d), DetailField::Contact2Relation) => {
                d.contact2_relation = value;
                true
            }
            _ => false,
        };

        if applied && field == DetailField::Name {
            self.regenerate_message_if_touched();
        }
        applied
    }

    pub fn toggle_section(&mut self, section: Section) {
        match section {
            Section::EmergencyDetails => {
                self.sections.emergency_details = !self.sections.emergency_details;
            }
            Section::PedigreeInfo => self.sections.pedigree_info = !self.sections.pedigree_info,
            Section::EmergencyMedicalDetails => {
                self.sections.emergency_medical_details = !self.sections.emergency_medical_details;
            }
            Section::EmergencyContacts => {
                self.sections.emergency_contacts = !self.sections.emergency_contacts;
            }
        }
    }

    pub fn toggle_setting(&mut self, setting: Setting) {
        match setting {
            Setting::InstantAlerts => self.settings.instant_alerts = !self.settings.instant_alerts,
            Setting::LocationSharing => {
                self.settings.location_sharing = !self.settings.location_sharing;
            }
            Setting::ShowContactOnFinderPage => {
                self.settings.show_contact_on_finder_page =
                    !self.settings.show_contact_on_finder_page;
            }
            Setting::UseBackupNumber => {
                self.settings.use_backup_number = !self.settings.use_backup_number;
            }
        }
    }

    /// First focus of the message field seeds the template; later focuses
    /// are no-ops so manual edits survive refocusing.
    pub fn focus_message(&mut self) {
        if !self.contact.message_clicked {
            self.contact.message_clicked = true;
            self.contact.message =
                default_finder_message(self.selected_type, self.details.name());
        }
    }

    fn regenerate_message_if_touched(&mut self) {
        if self.contact.message_clicked {
            self.contact.message =
                default_finder_message(self.selected_type, self.details.name());
        }
    }

    /// The clearing pass for "any" tags. Replacing the details union with a
    /// fresh variant discards the other types' fields and every image slot
    /// structurally; section flags collapse so the user re-opens what the
    /// new type needs. Contact fields and their errors are kept.
    pub fn switch_type(&mut self, new_type: TagType) {
        if new_type == self.selected_type || !new_type.is_concrete() {
            return;
        }
        self.selected_type = new_type;
        self.details = TagDetails::empty_for(new_type);
        self.sections.collapse();
        self.age_error.clear();
        self.phone_errors.clear_section_fields();
        self.regenerate_message_if_touched();
    }

    pub fn set_image(&mut self, data_url: String) {
        *self.details.image_mut() = Some(data_url);
    }

    pub fn clear_image(&mut self) {
        *self.details.image_mut() = None;
    }

    #[must_use]
    pub fn required_fields_missing(&self) -> bool {
        self.contact.name.trim().is_empty()
            || self.contact.email.trim().is_empty()
            || self.contact.phone.trim().is_empty()
            || self.details.name().trim().is_empty()
    }

    /// The submit button's enabled-state predicate: the four required
    /// presences, email format, and a clear main/backup phone error map.
    #[must_use]
    pub fn is_form_valid(&self) -> bool {
        !self.required_fields_missing()
            && self.email_error.is_empty()
            && self.phone_errors.main_and_backup_clear()
    }

    /// Section-level phone errors only block while their fields are
    /// actually collected for the current type and toggle state.
    #[must_use]
    pub fn visible_section_errors_clear(&self) -> bool {
        let pet_section = matches!(self.details, TagDetails::Pet(_)) && self.sections.emergency_details;
        if pet_section && !(self.phone_errors.vet.is_empty() && self.phone_errors.emergency.is_empty())
        {
            return false;
        }
        let contacts_section =
            matches!(self.details, TagDetails::Emergency(_)) && self.sections.emergency_contacts;
        if contacts_section
            && !(self.phone_errors.emergency_contact1.is_empty()
                && self.phone_errors.emergency_contact2.is_empty())
        {
            return false;
        }
        true
    }

    /// The first offending field in the fixed priority order, or None when
    /// a submission may proceed.
    #[must_use]
    pub fn first_invalid_field(&self) -> Option<FormField> {
        if self.contact.name.trim().is_empty() {
            return Some(FormField::ContactName);
        }
        if self.contact.email.trim().is_empty() || !self.email_error.is_empty() {
            return Some(FormField::Email);
        }
        if self.contact.phone.trim().is_empty() || !self.phone_errors.main.is_empty() {
            return Some(FormField::Phone);
        }
        if !self.phone_errors.backup.is_empty() {
            return Some(FormField::BackupPhone);
        }
        if self.details.name().trim().is_empty() {
            return Some(FormField::DetailsName);
        }
        if !self.age_error.is_empty() {
            return Some(FormField::Age);
        }
        let pet_section = matches!(self.details, TagDetails::Pet(_)) && self.sections.emergency_details;
        if pet_section {
            if !self.phone_errors.vet.is_empty() {
                return Some(FormField::VetPhone);
            }
            if !self.phone_errors.emergency.is_empty() {
                return Some(FormField::EmergencyPhone);
            }
        }
        let contacts_section =
            matches!(self.details, TagDetails::Emergency(_)) && self.sections.emergency_contacts;
        if contacts_section {
            if !self.phone_errors.emergency_contact1.is_empty() {
                return Some(FormField::EmergencyContact1Phone);
            }
            if !self.phone_errors.emergency_contact2.is_empty() {
                return Some(FormField::EmergencyContact2Phone);
            }
        }
        None
    }

    /// Builds the submission payload. Fields behind a collapsed section are
    /// sent empty regardless of any stale values still held in the form,
    /// the phone numbers are composed into international form, and a blank
    /// backup phone is omitted entirely.
    #[must_use]
    pub fn build_payload(&self) -> ActivationRequest {
        let backup = self.contact.backup_phone.trim();
        let contact = ActivationContact {
            name: self.contact.name.trim().to_string(),
            email: self.contact.email.trim().to_string(),
            phone: compose_phone(&self.contact.country, &self.contact.phone),
            backup_phone: if backup.is_empty() {
                None
            } else {
                Some(compose_phone(&self.contact.country, backup))
            },
            message: self.contact.message.clone(),
        };

        let mut details = self.details.clone();
        match &mut details {
            TagDetails::Item(_) => {}
            TagDetails::Pet(d) => {
                if !self.sections.emergency_details {
                    d.medical_notes.clear();
                    d.vet_name.clear();
                    d.vet_phone.clear();
                    d.emergency_name.clear();
                    d.emergency_phone.clear();
                }
                if !self.sections.pedigree_info {
                    d.pedigree_number.clear();
                    d.breeder_name.clear();
                }
            }
            TagDetails::Emergency(d) => {
                if !self.sections.emergency_medical_details {
                    d.medical_aid.clear();
                    d.blood_type.clear();
                    d.allergies.clear();
                    d.medications.clear();
                    d.ice_note.clear();
                    d.organ_donor = false;
                }
                if !self.sections.emergency_contacts {
                    d.contact1_name.clear();
                    d.contact1_phone.clear();
                    d.contact1_relation.clear();
                    d.contact2_name.clear();
                    d.contact2_phone.clear();
                    d.contact2_relation.clear();
                }
            }
        }

        ActivationRequest {
            tag_type: self.selected_type,
            contact,
            details,
            settings: self.settings,
        }
    }
}
