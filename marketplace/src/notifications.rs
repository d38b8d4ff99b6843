//! Notification emails.
//!
//! Every builder returns a finished [`Email`]. User-supplied text (names,
//! messages, decline reasons) is HTML-escaped before it reaches the HTML
//! body.

use crate::providers::Email;
use crate::types::{BookingRequest, Money, Profile, WaitlistEntry, WaitlistRole};
use gigbook_web::html::escape;

/// Absolute links back into the site.
#[derive(Debug, Clone)]
pub struct Links {
    site_url: String,
}

impl Links {
    /// Links under `site_url`.
    #[must_use]
    pub fn new(site_url: &str) -> Self {
        Self {
            site_url: site_url.trim_end_matches('/').to_string(),
        }
    }

    /// Absolute URL for a site path.
    #[must_use]
    pub fn absolute(&self, path: &str) -> String {
        format!("{}{path}", self.site_url)
    }

    /// The client's status page.
    #[must_use]
    pub fn client_status(&self, booking: &BookingRequest) -> String {
        self.absolute(&booking.status_path())
    }

    /// The DJ's request detail page.
    #[must_use]
    pub fn dashboard_request(&self, booking: &BookingRequest) -> String {
        self.absolute(&format!("/dashboard/requests/{}", booking.id))
    }

    /// Public profile page.
    #[must_use]
    pub fn profile(&self, profile: &Profile) -> String {
        self.absolute(&format!("/dj/{}", profile.slug))
    }
}

fn layout(heading: &str, paragraphs: &[String], link: Option<(&str, &str)>) -> String {
    let mut html = format!(
        "<div style=\"font-family:sans-serif;max-width:560px\"><h2>{}</h2>",
        escape(heading)
    );
    for paragraph in paragraphs {
        html.push_str("<p>");
        html.push_str(paragraph);
        html.push_str("</p>");
    }
    if let Some((label, href)) = link {
        html.push_str(&format!(
            "<p><a href=\"{}\">{}</a></p>",
            escape(href),
            escape(label)
        ));
    }
    html.push_str("<p style=\"color:#888\">Gigbook</p></div>");
    html
}

fn summary(booking: &BookingRequest) -> String {
    let mut lines = vec![format!("Date: {}", booking.event_date.format("%A %-d %B %Y"))];
    if !booking.event_type.is_empty() {
        lines.push(format!("Event: {}", booking.event_type));
    }
    if !booking.venue.is_empty() {
        lines.push(format!("Venue: {}", booking.venue));
    }
    if let Some(guests) = booking.guest_count {
        lines.push(format!("Guests: {guests}"));
    }
    lines.join("\n")
}

fn summary_html(booking: &BookingRequest) -> String {
    escape(&summary(booking)).replace('\n', "<br>")
}

/// New request, to the DJ.
#[must_use]
pub fn new_request(profile: &Profile, booking: &BookingRequest, links: &Links) -> Email {
    let url = links.dashboard_request(booking);
    let mut paragraphs = vec![
        format!(
            "{} ({}) would like to book you.",
            escape(&booking.client_name),
            escape(&booking.client_email)
        ),
        summary_html(booking),
    ];
    if !booking.message.is_empty() {
        paragraphs.push(format!("&ldquo;{}&rdquo;", escape(&booking.message)));
    }

    Email {
        to: profile.contact_email.clone(),
        subject: format!("New booking request from {}", booking.client_name),
        html: layout("New booking request", &paragraphs, Some(("Review the request", &url))),
        text: format!(
            "{} ({}) would like to book you.\n\n{}\n\n{}\n\nReview it at {url}\n",
            booking.client_name,
            booking.client_email,
            summary(booking),
            booking.message
        ),
        reply_to: Some(booking.client_email.clone()),
    }
}

/// Submission receipt, to the client.
#[must_use]
pub fn request_received(profile: &Profile, booking: &BookingRequest, links: &Links) -> Email {
    let url = links.client_status(booking);
    Email {
        to: booking.client_email.clone(),
        subject: format!("Your request to {} was sent", profile.display_name),
        html: layout(
            "Request sent",
            &[
                format!(
                    "Hi {}, we passed your request on to {}. You'll get an email when they reply.",
                    escape(&booking.client_name),
                    escape(&profile.display_name)
                ),
                summary_html(booking),
            ],
            Some(("Check the status", &url)),
        ),
        text: format!(
            "Hi {}, we passed your request on to {}. You'll get an email when they reply.\n\n{}\n\nStatus: {url}\n",
            booking.client_name,
            profile.display_name,
            summary(booking)
        ),
        reply_to: None,
    }
}

/// Accepted, to the client, with the deposit link.
#[must_use]
pub fn accepted(profile: &Profile, booking: &BookingRequest, links: &Links, currency: &str) -> Email {
    let url = links.client_status(booking);
    let deposit = booking
        .deposit_cents
        .map(|cents| Money::new(cents, currency).to_string());
    let deposit_line = deposit.as_ref().map_or_else(
        || "They will be in touch about next steps.".to_string(),
        |amount| format!("Pay the {amount} deposit to lock in the date."),
    );

    Email {
        to: booking.client_email.clone(),
        subject: format!("{} accepted your booking request", profile.display_name),
        html: layout(
            "Good news!",
            &[
                format!(
                    "{} accepted your request for {}.",
                    escape(&profile.display_name),
                    booking.event_date.format("%-d %B %Y")
                ),
                escape(&deposit_line),
            ],
            Some(("Pay the deposit", &url)),
        ),
        text: format!(
            "{} accepted your request for {}.\n\n{deposit_line}\n\n{url}\n",
            profile.display_name,
            booking.event_date.format("%-d %B %Y")
        ),
        reply_to: Some(profile.contact_email.clone()).filter(|e| !e.is_empty()),
    }
}

/// Declined, to the client.
#[must_use]
pub fn declined(profile: &Profile, booking: &BookingRequest) -> Email {
    let reason = booking
        .decline_reason
        .as_deref()
        .filter(|reason| !reason.trim().is_empty());

    let mut paragraphs = vec![format!(
        "Sorry, {} can't take your booking for {}.",
        escape(&profile.display_name),
        booking.event_date.format("%-d %B %Y")
    )];
    if let Some(reason) = reason {
        paragraphs.push(format!("Their note: &ldquo;{}&rdquo;", escape(reason)));
    }

    Email {
        to: booking.client_email.clone(),
        subject: format!("{} declined your booking request", profile.display_name),
        html: layout("Booking declined", &paragraphs, None),
        text: format!(
            "Sorry, {} can't take your booking for {}.\n{}",
            profile.display_name,
            booking.event_date.format("%-d %B %Y"),
            reason.map(|r| format!("\nTheir note: {r}\n")).unwrap_or_default()
        ),
        reply_to: None,
    }
}

/// Deposit paid, to the DJ.
#[must_use]
pub fn deposit_paid_dj(profile: &Profile, booking: &BookingRequest, links: &Links, currency: &str) -> Email {
    let amount = Money::new(booking.deposit_cents.unwrap_or_default(), currency);
    let url = links.dashboard_request(booking);
    Email {
        to: profile.contact_email.clone(),
        subject: format!("{} paid the deposit", booking.client_name),
        html: layout(
            "Deposit received",
            &[
                format!(
                    "{} paid the {amount} deposit for {}.",
                    escape(&booking.client_name),
                    booking.event_date.format("%-d %B %Y")
                ),
                summary_html(booking),
            ],
            Some(("Open the booking", &url)),
        ),
        text: format!(
            "{} paid the {amount} deposit for {}.\n\n{}\n\n{url}\n",
            booking.client_name,
            booking.event_date.format("%-d %B %Y"),
            summary(booking)
        ),
        reply_to: Some(booking.client_email.clone()),
    }
}

/// Deposit paid, to the client.
#[must_use]
pub fn deposit_paid_client(profile: &Profile, booking: &BookingRequest, links: &Links, currency: &str) -> Email {
    let amount = Money::new(booking.deposit_cents.unwrap_or_default(), currency);
    let url = links.client_status(booking);
    Email {
        to: booking.client_email.clone(),
        subject: format!("Your booking with {} is confirmed", profile.display_name),
        html: layout(
            "You're booked",
            &[format!(
                "We received your {amount} deposit. {} is confirmed for {}.",
                escape(&profile.display_name),
                booking.event_date.format("%-d %B %Y")
            )],
            Some(("View your booking", &url)),
        ),
        text: format!(
            "We received your {amount} deposit. {} is confirmed for {}.\n\n{url}\n",
            profile.display_name,
            booking.event_date.format("%-d %B %Y")
        ),
        reply_to: Some(profile.contact_email.clone()).filter(|e| !e.is_empty()),
    }
}

/// Closed, to the client.
#[must_use]
pub fn closed(profile: &Profile, booking: &BookingRequest) -> Email {
    Email {
        to: booking.client_email.clone(),
        subject: format!("Your booking with {} is complete", profile.display_name),
        html: layout(
            "Thanks for booking",
            &[format!(
                "{} marked your booking for {} as complete. Thanks for using Gigbook!",
                escape(&profile.display_name),
                booking.event_date.format("%-d %B %Y")
            )],
            None,
        ),
        text: format!(
            "{} marked your booking for {} as complete. Thanks for using Gigbook!\n",
            profile.display_name,
            booking.event_date.format("%-d %B %Y")
        ),
        reply_to: None,
    }
}

/// Waitlist confirmation.
#[must_use]
pub fn waitlist_welcome(entry: &WaitlistEntry, links: &Links) -> Email {
    let pitch = match entry.role {
        WaitlistRole::Dj => "We'll let you know as soon as you can publish your DJ profile.",
        WaitlistRole::Client => "We'll let you know as soon as DJs near you are taking bookings.",
    };
    let url = links.absolute("/");
    Email {
        to: entry.email.clone(),
        subject: "You're on the Gigbook waitlist".to_string(),
        html: layout("You're on the list", &[escape(pitch)], Some(("Visit Gigbook", &url))),
        text: format!("{pitch}\n\n{url}\n"),
        reply_to: None,
    }
}
