//! Shared models for the association integration tests.

#![allow(dead_code)]

use massguard::prelude::*;
use std::rc::Rc;
use std::sync::Arc;

pub struct Fixture {
    pub ctx: AssociationContext,
    pub store: Rc<MemoryStore>,
}

/// Authors with posts, a profile and photos through the profile; users in
/// groups through memberships; students in courses through enrollments,
/// where each course holds a single enrollment; companies with a nested
/// through chain.
pub fn registry() -> Registry {
    Registry::new()
        .model(
            ModelSchema::new("Author")
                .columns(["id", "name"])
                .reflect(Reflection::has_many("posts", "Post").inverse_of("author"))
                .reflect(
                    Reflection::has_many("drafts", "Post")
                        .where_eq("state", "draft")
                        .inverse_of("author"),
                )
                .reflect(Reflection::has_one("profile", "Profile").inverse_of("author"))
                .reflect(Reflection::has_many("photos", "Photo").through("profile")),
        )
        .model(
            ModelSchema::new("Post")
                .columns(["id", "author_id", "title", "body"])
                .column(ColumnDef::new("state").with_default("published"))
                .reflect(Reflection::belongs_to("author", "Author").inverse_of("posts"))
                .validate(Validation::Presence("title"))
                .validate(Validation::Length {
                    attribute: "title",
                    min: None,
                    max: Some(40),
                }),
        )
        .model(
            ModelSchema::new("Profile")
                .columns(["id", "author_id", "bio"])
                .reflect(Reflection::belongs_to("author", "Author").inverse_of("profile"))
                .reflect(Reflection::has_many("photos", "Photo").inverse_of("profile"))
                .validate(Validation::Presence("bio")),
        )
        .model(
            ModelSchema::new("Photo")
                .columns(["id", "profile_id", "caption"])
                .reflect(Reflection::belongs_to("profile", "Profile").inverse_of("photos")),
        )
        .model(
            ModelSchema::new("Company")
                .columns(["id", "name"])
                .reflect(Reflection::has_many("users", "User"))
                .reflect(Reflection::has_many("groups", "Group").through("users")),
        )
        .model(
            ModelSchema::new("User")
                .columns(["id", "company_id", "name"])
                .reflect(Reflection::has_many("memberships", "Membership").inverse_of("user"))
                .reflect(Reflection::has_many("groups", "Group").through("memberships")),
        )
        .model(
            ModelSchema::new("Membership")
                .columns(["id", "user_id", "group_id"])
                .column(ColumnDef::new("role").with_default("member"))
                .reflect(Reflection::belongs_to("user", "User").inverse_of("memberships"))
                .reflect(Reflection::belongs_to("group", "Group").inverse_of("memberships")),
        )
        .model(
            ModelSchema::new("Group")
                .columns(["id", "name"])
                .reflect(Reflection::has_many("memberships", "Membership").inverse_of("group"))
                .reflect(Reflection::has_many("users", "User").through("memberships"))
                .validate(Validation::Presence("name")),
        )
        .model(
            ModelSchema::new("Student")
                .columns(["id", "name"])
                .reflect(Reflection::has_many("enrollments", "Enrollment").inverse_of("student"))
                .reflect(Reflection::has_many("courses", "Course").through("enrollments")),
        )
        .model(
            ModelSchema::new("Enrollment")
                .columns(["id", "student_id", "course_id"])
                .reflect(Reflection::belongs_to("student", "Student").inverse_of("enrollments"))
                .reflect(Reflection::belongs_to("course", "Course").inverse_of("enrollment")),
        )
        .model(
            ModelSchema::new("Course")
                .columns(["id", "name"])
                .reflect(Reflection::has_one("enrollment", "Enrollment").inverse_of("course")),
        )
}

pub fn whitelist() -> Whitelist {
    Whitelist::new()
        .allow("Author", ["name"])
        .allow("Post", ["title", "body", "state"])
        .allow("Profile", ["bio"])
        .allow("Photo", ["caption"])
        .allow("Company", ["name"])
        .allow("User", ["name"])
        .allow("Group", ["name"])
        .allow("Student", ["name"])
        .allow("Course", ["name"])
}

pub fn fixture() -> Fixture {
    fixture_with(whitelist())
}

pub fn fixture_with(policy: Whitelist) -> Fixture {
    let store = Rc::new(MemoryStore::new());
    let ctx = AssociationContext::new(Arc::new(registry()), Rc::new(policy), store.clone());
    Fixture { ctx, store }
}

impl Fixture {
    /// A new, unsaved record.
    pub fn record(&self, model: &str, name: &str) -> RecordRef {
        self.ctx.new_record(model, [("name", name)]).unwrap()
    }

    /// A saved record.
    pub fn saved(&self, model: &str, name: &str) -> RecordRef {
        let record = self.record(model, name);
        assert!(self.store.save(&record).unwrap());
        record
    }
}

pub fn get(record: &RecordRef, column: &str) -> Value {
    record.borrow().get(column).cloned().unwrap_or_default()
}
