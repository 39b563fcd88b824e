use crux_core::testing::AppTester;

use scanback_core::{
    ApiOperation, ApiOutput, App, ContactField, DetailField, Effect, Event, Model, ScanState,
    Section, TagCode, TagDetails, TagRecord, TagSettings, TagType, ViewModel, ViewState,
};

fn tester() -> AppTester<App, Effect> {
    AppTester::default()
}

fn view_of(model: &Model) -> ViewModel {
    crux_core::App::view(&App::default(), model)
}

fn any_tag(code: &str) -> TagRecord {
    TagRecord {
        code: TagCode::new(code),
        tag_type: TagType::Any,
        is_activated: false,
        contact: None,
        details: None,
        settings: TagSettings::default(),
    }
}

fn fetched_ok(record: TagRecord) -> Event {
    Event::TagFetched(Box::new(Ok(ApiOutput::Tag(Box::new(record)))))
}

#[test]
fn any_tag_defaults_to_item_with_all_choices() {
    let app = tester();
    let mut model = Model::default();

    app.update(
        Event::ScanStarted {
            code: "SB-TEST02".into(),
            requested_type: None,
        },
        &mut model,
    );
    app.update(fetched_ok(any_tag("SB-TEST02")), &mut model);

    assert_eq!(model.selected_tag_type(), Some(TagType::Item));
    match view_of(&model).state {
        ViewState::ActivationForm(form) => {
            assert_eq!(form.stored_type, TagType::Any);
            assert_eq!(form.selected_type, TagType::Item);
            assert_eq!(
                form.type_choices,
                vec![TagType::Item, TagType::Pet, TagType::Emergency]
            );
        }
        other => panic!("expected activation form, got {other:?}"),
    }
}

#[test]
fn query_parameter_preselects_emergency_fields() {
    let app = tester();
    let mut model = Model::default();

    app.update(
        Event::ScanStarted {
            code: "SB-TEST02".into(),
            requested_type: Some("emergency".into()),
        },
        &mut model,
    );
    app.update(fetched_ok(any_tag("SB-TEST02")), &mut model);

    assert_eq!(model.selected_tag_type(), Some(TagType::Emergency));
    match view_of(&model).state {
        ViewState::ActivationForm(form) => {
            assert!(matches!(form.details, TagDetails::Emergency(_)));
        }
        other => panic!("expected activation form, got {other:?}"),
    }

    // Emergency-only fields apply; pet/item fields are dropped.
    app.update(
        Event::DetailEdited {
            field: DetailField::MedicalAid,
            value: "Discovery".into(),
        },
        &mut model,
    );
    app.update(
        Event::DetailEdited {
            field: DetailField::Breed,
            value: "Border Collie".into(),
        },
        &mut model,
    );
    match &model.form.as_ref().expect("form").details {
        TagDetails::Emergency(d) => assert_eq!(d.medical_aid, "Discovery"),
        other => panic!("expected emergency details, got {other:?}"),
    }
}

#[test]
fn query_parameter_ignored_for_pre_typed_tag() {
    let app = tester();
    let mut model = Model::default();

    app.update(
        Event::ScanStarted {
            code: "SB-TEST02".into(),
            requested_type: Some("emergency".into()),
        },
        &mut model,
    );
    let mut record = any_tag("SB-TEST02");
    record.tag_type = TagType::Pet;
    app.update(fetched_ok(record), &mut model);

    assert_eq!(model.selected_tag_type(), Some(TagType::Pet));
}

#[test]
fn invalid_query_parameter_falls_back_to_item() {
    let app = tester();
    let mut model = Model::default();

    app.update(
        Event::ScanStarted {
            code: "SB-TEST02".into(),
            requested_type: Some("vehicle".into()),
        },
        &mut model,
    );
    app.update(fetched_ok(any_tag("SB-TEST02")), &mut model);

    assert_eq!(model.selected_tag_type(), Some(TagType::Item));
}

#[test]
fn switching_type_clears_stale_fields_from_submission() {
    let app = tester();
    let mut model = Model::default();

    app.update(
        Event::ScanStarted {
            code: "SB-TEST02".into(),
            requested_type: Some("pet".into()),
        },
        &mut model,
    );
    app.update(fetched_ok(any_tag("SB-TEST02")), &mut model);

    // Populate pet-only fields, then change course to an item.
    app.update(
        Event::DetailEdited {
            field: DetailField::Breed,
            value: "Border Collie".into(),
        },
        &mut model,
    );
    app.update(
        Event::SectionToggled(Section::EmergencyDetails),
        &mut model,
    );
    app.update(
        Event::DetailEdited {
            field: DetailField::VetName,
            value: "Dr Nel".into(),
        },
        &mut model,
    );
    app.update(Event::TagTypeSelected(TagType::Item), &mut model);

    assert_eq!(model.selected_tag_type(), Some(TagType::Item));
    match view_of(&model).state {
        ViewState::ActivationForm(form) => {
            assert!(matches!(form.details, TagDetails::Item(_)));
            // Section flags collapse on every switch.
            assert!(!form.sections.emergency_details);
        }
        other => panic!("expected activation form, got {other:?}"),
    }

    // Finish the item form and submit; nothing pet-shaped may leak.
    app.update(
        Event::ContactEdited {
            field: ContactField::Name,
            value: "Thandi".into(),
        },
        &mut model,
    );
    app.update(
        Event::ContactEdited {
            field: ContactField::Email,
            value: "a@b.com".into(),
        },
        &mut model,
    );
    app.update(
        Event::ContactEdited {
            field: ContactField::Phone,
            value: "821234567".into(),
        },
        &mut model,
    );
    app.update(
        Event::DetailEdited {
            field: DetailField::Name,
            value: "Backpack".into(),
        },
        &mut model,
    );
    let update = app.update(Event::SubmitRequested, &mut model);

    let request = update
        .effects
        .iter()
        .find_map(|e| match e {
            Effect::Api(req) => match &req.operation {
                ApiOperation::Activate { request, .. } => Some(request.clone()),
                _ => None,
            },
            _ => None,
        })
        .expect("activation request emitted");
    assert_eq!(request.tag_type, TagType::Item);
    match &request.details {
        TagDetails::Item(d) => assert_eq!(d.name, "Backpack"),
        other => panic!("expected item details in payload, got {other:?}"),
    }
}

#[test]
fn type_selection_ignored_for_pre_typed_tag() {
    let app = tester();
    let mut model = Model::default();

    app.update(
        Event::ScanStarted {
            code: "SB-TEST01".into(),
            requested_type: None,
        },
        &mut model,
    );
    let mut record = any_tag("SB-TEST01");
    record.tag_type = TagType::Pet;
    app.update(fetched_ok(record), &mut model);

    let update = app.update(Event::TagTypeSelected(TagType::Item), &mut model);
    assert!(update.effects.is_empty());
    assert_eq!(model.selected_tag_type(), Some(TagType::Pet));
    assert_eq!(model.scan_state, ScanState::ActivationForm);
}

#[test]
fn message_template_follows_type_switch() {
    let app = tester();
    let mut model = Model::default();

    app.update(
        Event::ScanStarted {
            code: "SB-TEST02".into(),
            requested_type: Some("pet".into()),
        },
        &mut model,
    );
    app.update(fetched_ok(any_tag("SB-TEST02")), &mut model);

    app.update(
        Event::DetailEdited {
            field: DetailField::Name,
            value: "Luna".into(),
        },
        &mut model,
    );
    app.update(Event::MessageFocused, &mut model);
    let message = model.form.as_ref().expect("form").contact.message.clone();
    assert!(message.contains("Luna"));

    // Emergency template is fixed and replaces the pet one wholesale.
    app.update(Event::TagTypeSelected(TagType::Emergency), &mut model);
    let message = model.form.as_ref().expect("form").contact.message.clone();
    assert!(!message.contains("Luna"));
    assert!(message.contains("emergency"));
}
