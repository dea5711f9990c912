//! Customer notifications attached to potential actions.

use domain::{EmailAddress, EmailMessage, Order};

fn envelope(order: &Order, identifier: String, about: String, text: String) -> EmailMessage {
    EmailMessage {
        identifier,
        sender: EmailAddress {
            name: order.seller.name.clone(),
            email: order.seller.email.clone(),
        },
        to_recipient: EmailAddress {
            name: order.customer_contact.name.clone(),
            email: order.customer_contact.email.clone(),
        },
        about,
        text,
    }
}

/// Sent once the order has been delivered.
pub fn order_delivered(order: &Order) -> EmailMessage {
    let seats: Vec<String> = order
        .accepted_offers
        .iter()
        .map(|offer| format!("{} seat {}", offer.event_id, offer.seat_number))
        .collect();

    envelope(
        order,
        format!("SendOrder-{}", order.order_number),
        format!("Your order {}", order.order_number),
        format!(
            "Dear {},\n\nThank you for your order {}.\nSeats: {}\nTotal: {}\n",
            order.customer_contact.name,
            order.order_number,
            seats.join(", "),
            order.price
        ),
    )
}

/// Sent once a return has been processed.
pub fn order_returned(order: &Order, refund_total: i64) -> EmailMessage {
    envelope(
        order,
        format!("ReturnOrder-{}", order.order_number),
        format!("Your order {} has been returned", order.order_number),
        format!(
            "Dear {},\n\nYour order {} has been returned.\nRefunded: {}\n",
            order.customer_contact.name, order.order_number, refund_total
        ),
    )
}
