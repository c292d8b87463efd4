//! `parlor characters` — who you can talk to.

use parlor_engine::DeliveryController;

use super::Runtime;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::boot().await?;
    print_list(&rt.controller).await;
    Ok(())
}

pub async fn print_list(controller: &DeliveryController) {
    let rows: Vec<(String, String, String, usize, bool, bool)> = controller
        .read(|state| {
            state
                .conversations
                .characters()
                .iter()
                .map(|c| {
                    (
                        c.avatar.clone(),
                        c.name.clone(),
                        c.id.clone(),
                        c.turns().count(),
                        c.unread,
                        state.typing.is_in_flight(&c.id),
                    )
                })
                .collect()
        })
        .await;

    println!("  Characters");
    println!("  ==========");
    for (avatar, name, id, turns, unread, typing) in rows {
        let marker = if typing {
            " (typing…)"
        } else if unread {
            " ●"
        } else {
            ""
        };
        println!("  {avatar} {name}{marker}");
        println!("      id: {id}, {turns} messages");
    }
}
