//! Room lifecycle: leaving, stopping, skipping and disconnecting.
//!
//! Every operation here tolerates stale input. A room id that no longer
//! exists, a partner id that is not in the room, a client that already
//! left: all of these are normal races between two browsers and a server,
//! and all of them end in a quiet no-op rather than an error.

use duet_protocol::{ClientId, RoomId, ServerMessage};

use crate::{Matchmaker, Notification};

impl Matchmaker {
    /// Dissolves `room_id` if `client_id` is one of its members.
    ///
    /// `partner_id` receives `user-left` when it is present, distinct from
    /// `client_id`, and actually in the room. Both members end up `Idle`
    /// (or stay `Transitioning` if their marker is held). Returns whether
    /// a room was dissolved.
    pub fn leave_room(
        &mut self,
        client_id: ClientId,
        room_id: &RoomId,
        partner_id: Option<ClientId>,
        out: &mut Vec<Notification>,
    ) -> bool {
        let Some(room) = self.rooms.get(room_id) else {
            tracing::debug!(%client_id, %room_id, "leave for unknown room ignored");
            return false;
        };
        if !room.contains(client_id) {
            tracing::debug!(%client_id, %room_id, "leave from non-member ignored");
            return false;
        }

        if let Some(partner_id) = partner_id.filter(|p| *p != client_id && room.contains(*p)) {
            out.push(Notification::new(
                partner_id,
                ServerMessage::UserLeft {
                    room_id: room_id.clone(),
                },
            ));
        }

        let Some(room) = self.rooms.remove(room_id) else {
            return false;
        };
        tracing::info!(
            %room_id,
            %client_id,
            lasted_ms = room.age().as_millis() as u64,
            rooms = self.rooms.len(),
            "room dissolved"
        );
        for member in room.members() {
            self.settle(member);
        }
        true
    }

    /// Leaves the current room (if any) and stops looking for a partner.
    ///
    /// The ex-partner gets `user-left` followed by `clear-session-state`.
    /// Calling it again with the same room is a no-op.
    pub fn stop(
        &mut self,
        client_id: ClientId,
        room_id: Option<RoomId>,
        partner_id: Option<ClientId>,
    ) -> Vec<Notification> {
        let mut out = Vec::new();
        if !self.registry.contains(client_id) {
            tracing::debug!(%client_id, "stop from unknown client ignored");
            return out;
        }

        let ran = self.with_marker(client_id, |mm| {
            if let Some(ex_partner) = mm.depart(client_id, room_id, partner_id, &mut out) {
                out.push(Notification::new(ex_partner, ServerMessage::ClearSessionState));
            }
            mm.queue.remove(client_id);
        });

        match ran {
            Some(()) => tracing::info!(%client_id, "client stopped"),
            None => tracing::debug!(%client_id, "stop dropped, client already transitioning"),
        }
        out
    }

    /// Leaves the current room (if any) and immediately looks for someone
    /// new, all under one marker acquisition.
    ///
    /// If the supplied room id was stale and the client still sits in a
    /// different room, it stays there and no match is attempted.
    pub fn skip(
        &mut self,
        client_id: ClientId,
        room_id: Option<RoomId>,
        partner_id: Option<ClientId>,
    ) -> Vec<Notification> {
        let mut out = Vec::new();
        if !self.registry.contains(client_id) {
            tracing::debug!(%client_id, "next from unknown client ignored");
            return out;
        }

        let ran = self.with_marker(client_id, |mm| {
            if let Some(ex_partner) = mm.depart(client_id, room_id, partner_id, &mut out) {
                out.push(Notification::new(ex_partner, ServerMessage::ClearSessionState));
            }
            if let Some(room) = mm.rooms.room_of(client_id) {
                tracing::debug!(%client_id, room_id = %room.id(), "next with stale room, still seated");
                return;
            }
            mm.match_marked(client_id, &mut out);
        });

        if ran.is_none() {
            tracing::debug!(%client_id, "next dropped, client already transitioning");
        }
        out
    }

    /// Removes every trace of `client_id`.
    ///
    /// Never blocks on a held marker: a disconnect wins over whatever was
    /// in flight. If the client was in a room, its partner gets
    /// `user-left` and is put straight back into matching, so the next
    /// client to start can pair with it.
    pub fn disconnect(&mut self, client_id: ClientId) -> Vec<Notification> {
        let mut out = Vec::new();

        self.queue.remove(client_id);
        self.guard.release(client_id);

        let seat = self
            .rooms
            .room_of(client_id)
            .map(|room| (room.id().clone(), room.partner_of(client_id)));
        if let Some((room_id, partner_id)) = seat {
            let dissolved = self.leave_room(client_id, &room_id, partner_id, &mut out);
            if let Some(partner_id) = partner_id.filter(|_| dissolved) {
                self.rematch_abandoned(partner_id, &mut out);
            }
        }

        match self.registry.deregister(client_id) {
            Some(connected_for) => tracing::info!(
                %client_id,
                connected_secs = connected_for.as_secs(),
                connected = self.registry.len(),
                "client deregistered"
            ),
            None => tracing::debug!(%client_id, "disconnect for unknown client"),
        }
        out
    }

    /// Runs the matching step for a client whose partner vanished.
    fn rematch_abandoned(&mut self, client_id: ClientId, out: &mut Vec<Notification>) {
        let ran = self.with_marker(client_id, |mm| {
            if mm.rooms.room_of(client_id).is_none() {
                mm.match_marked(client_id, out);
            }
        });
        match ran {
            Some(()) => tracing::debug!(%client_id, "partner gone, back in matching"),
            None => tracing::debug!(%client_id, "partner gone, rematch skipped while transitioning"),
        }
    }

    /// Resolves which room the client means and leaves it.
    ///
    /// An omitted room id means "whatever room I am in", and an omitted
    /// partner means the room's other member. Returns the ex-partner if a
    /// room was dissolved.
    fn depart(
        &mut self,
        client_id: ClientId,
        room_id: Option<RoomId>,
        partner_id: Option<ClientId>,
        out: &mut Vec<Notification>,
    ) -> Option<ClientId> {
        let (room_id, partner_id) = match room_id {
            Some(room_id) => (room_id, partner_id),
            None => {
                let room = self.rooms.room_of(client_id)?;
                (room.id().clone(), room.partner_of(client_id))
            }
        };
        let ex_partner = self
            .rooms
            .get(&room_id)
            .and_then(|room| room.partner_of(client_id));
        let partner_id = partner_id.or(ex_partner);

        if self.leave_room(client_id, &room_id, partner_id, out) {
            ex_partner
        } else {
            None
        }
    }
}
