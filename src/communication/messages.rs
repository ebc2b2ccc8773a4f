use crate::errors::{ControlError, ControlResult};
use crate::models::direction::{Direction, Movement};
use crate::models::vehicle::{Vehicle, VehicleClass, VehicleId};
use serde::{Deserialize, Serialize};

/// Size of one message on the wire. Matches the C layout of
/// `{ i32, i32, bool, char[16], char[8], char[8], char[8], char[16] }`.
pub const WIRE_SIZE: usize = 68;

// Byte capacities of the string fields, terminator included.
const CLASS_LEN: usize = 16;
const CODE_LEN: usize = 8;
const MOVEMENT_LEN: usize = 16;

const ID_AT: usize = 0;
const PRIORITY_AT: usize = 4;
const EMERGENCY_AT: usize = 8;
const CLASS_AT: usize = 9;
const ORIGIN_AT: usize = CLASS_AT + CLASS_LEN;
const DESTINATION_AT: usize = ORIGIN_AT + CODE_LEN;
const APPROACH_AT: usize = DESTINATION_AT + CODE_LEN;
const MOVEMENT_AT: usize = APPROACH_AT + CODE_LEN;

/// Announcement that an emergency vehicle is heading to the neighbouring
/// intersection. Sent once, when the vehicle joins its lane here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinationMessage {
    vehicle_id: VehicleId,
    priority: i32,
    emergency: bool,
    class: String,
    origin: String,
    destination: String,
    approach: String,
    movement: String,
}

impl CoordinationMessage {
    /// Builds a message, rejecting any text field that would not fit on the
    /// wire with its terminator.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        vehicle_id: VehicleId,
        priority: i32,
        emergency: bool,
        class: &str,
        origin: &str,
        destination: &str,
        approach: Direction,
        movement: Movement,
    ) -> ControlResult<Self> {
        check_fits("class", class, CLASS_LEN)?;
        check_fits("origin", origin, CODE_LEN)?;
        check_fits("destination", destination, CODE_LEN)?;
        Ok(Self {
            vehicle_id,
            priority,
            emergency,
            class: class.to_string(),
            origin: origin.to_string(),
            destination: destination.to_string(),
            approach: approach.short_code().to_string(),
            movement: movement.as_str().to_string(),
        })
    }

    /// Message announcing `vehicle` joining the `approach` lane.
    pub fn for_transit(
        vehicle: &Vehicle,
        approach: Direction,
        movement: Movement,
    ) -> ControlResult<Self> {
        Self::new(
            vehicle.id(),
            vehicle.priority(),
            vehicle.is_emergency(),
            vehicle.class().as_str(),
            vehicle.origin(),
            vehicle.destination(),
            approach,
            movement,
        )
    }

    pub fn vehicle_id(&self) -> VehicleId {
        self.vehicle_id
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn is_emergency(&self) -> bool {
        self.emergency
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    /// The class tag as a known class, if it is one.
    pub fn vehicle_class(&self) -> ControlResult<VehicleClass> {
        self.class.parse()
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn approach(&self) -> &str {
        &self.approach
    }

    pub fn approach_direction(&self) -> ControlResult<Direction> {
        Direction::from_short_code(&self.approach)
    }

    pub fn movement(&self) -> &str {
        &self.movement
    }

    pub fn encode(&self) -> [u8; WIRE_SIZE] {
        let mut buf = [0u8; WIRE_SIZE];
        buf[ID_AT..ID_AT + 4].copy_from_slice(&self.vehicle_id.to_le_bytes());
        buf[PRIORITY_AT..PRIORITY_AT + 4].copy_from_slice(&self.priority.to_le_bytes());
        buf[EMERGENCY_AT] = u8::from(self.emergency);
        put_str(&mut buf[CLASS_AT..CLASS_AT + CLASS_LEN], &self.class);
        put_str(&mut buf[ORIGIN_AT..ORIGIN_AT + CODE_LEN], &self.origin);
        put_str(&mut buf[DESTINATION_AT..DESTINATION_AT + CODE_LEN], &self.destination);
        put_str(&mut buf[APPROACH_AT..APPROACH_AT + CODE_LEN], &self.approach);
        put_str(&mut buf[MOVEMENT_AT..MOVEMENT_AT + MOVEMENT_LEN], &self.movement);
        buf
    }

    pub fn decode(buf: &[u8; WIRE_SIZE]) -> ControlResult<Self> {
        let emergency = match buf[EMERGENCY_AT] {
            0 => false,
            1 => true,
            other => {
                return Err(ControlError::MalformedMessage(format!(
                    "emergency flag byte {}",
                    other
                )))
            }
        };
        Ok(Self {
            vehicle_id: read_i32(buf, ID_AT),
            priority: read_i32(buf, PRIORITY_AT),
            emergency,
            class: get_str("class", &buf[CLASS_AT..CLASS_AT + CLASS_LEN])?,
            origin: get_str("origin", &buf[ORIGIN_AT..ORIGIN_AT + CODE_LEN])?,
            destination: get_str("destination", &buf[DESTINATION_AT..DESTINATION_AT + CODE_LEN])?,
            approach: get_str("approach", &buf[APPROACH_AT..APPROACH_AT + CODE_LEN])?,
            movement: get_str("movement", &buf[MOVEMENT_AT..MOVEMENT_AT + MOVEMENT_LEN])?,
        })
    }
}

fn check_fits(field: &'static str, value: &str, capacity: usize) -> ControlResult<()> {
    let max = capacity - 1;
    if value.len() > max || value.as_bytes().contains(&0) {
        return Err(ControlError::FieldTooLong {
            field,
            max,
            len: value.len(),
        });
    }
    Ok(())
}

// Field is zeroed already; the remainder stays NUL padding.
fn put_str(field: &mut [u8], value: &str) {
    let bytes = value.as_bytes();
    field[..bytes.len()].copy_from_slice(bytes);
}

fn get_str(name: &str, field: &[u8]) -> ControlResult<String> {
    let end = field.iter().position(|&b| b == 0).ok_or_else(|| {
        ControlError::MalformedMessage(format!("{} is not NUL-terminated", name))
    })?;
    String::from_utf8(field[..end].to_vec())
        .map_err(|_| ControlError::MalformedMessage(format!("{} is not UTF-8", name)))
}

fn read_i32(buf: &[u8; WIRE_SIZE], at: usize) -> i32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[at..at + 4]);
    i32::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ambulance_transit() -> CoordinationMessage {
        CoordinationMessage::new(
            42,
            1,
            true,
            "ambulance",
            "F10",
            "F11",
            Direction::North,
            Movement::Straight,
        )
        .unwrap()
    }

    #[test]
    fn decodes_identical_record() {
        let msg = ambulance_transit();
        let bytes = msg.encode();
        assert_eq!(bytes.len(), WIRE_SIZE);
        let decoded = CoordinationMessage::decode(&bytes).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.vehicle_id(), 42);
        assert!(decoded.is_emergency());
        assert_eq!(decoded.origin(), "F10");
        assert_eq!(decoded.destination(), "F11");
        assert_eq!(decoded.approach(), "N");
        assert_eq!(decoded.approach_direction().unwrap(), Direction::North);
        assert_eq!(decoded.encode(), bytes);
    }

    #[test]
    fn layout_matches_fixed_offsets() {
        let bytes = ambulance_transit().encode();
        assert_eq!(&bytes[0..4], &42i32.to_le_bytes());
        assert_eq!(&bytes[4..8], &1i32.to_le_bytes());
        assert_eq!(bytes[8], 1);
        assert_eq!(&bytes[9..18], b"ambulance");
        assert_eq!(bytes[18], 0);
        assert_eq!(&bytes[25..28], b"F10");
        assert_eq!(&bytes[33..36], b"F11");
        assert_eq!(bytes[41], b'N');
        assert_eq!(&bytes[49..57], b"STRAIGHT");
        assert_eq!(&bytes[65..68], &[0, 0, 0]);
    }

    #[test]
    fn for_transit_copies_vehicle_fields() {
        let vehicle = Vehicle::new(104, VehicleClass::Firetruck, "F11", "F10", 2);
        let msg = CoordinationMessage::for_transit(&vehicle, Direction::East, Movement::Left).unwrap();
        assert_eq!(msg.priority(), 1);
        assert_eq!(msg.class(), "firetruck");
        assert_eq!(msg.vehicle_class().unwrap(), VehicleClass::Firetruck);
        assert_eq!(msg.approach(), "E");
        assert_eq!(msg.movement(), "LEFT");
    }

    #[test]
    fn oversized_fields_are_rejected() {
        let err = CoordinationMessage::new(
            1,
            3,
            false,
            "car",
            "INTERSECTION-F10",
            "F11",
            Direction::South,
            Movement::Right,
        )
        .unwrap_err();
        assert!(matches!(err, ControlError::FieldTooLong { field: "origin", max: 7, .. }));

        // Seven bytes still fit with the terminator.
        assert!(CoordinationMessage::new(
            1,
            3,
            false,
            "fifteen-chars!!",
            "F100000",
            "F11",
            Direction::South,
            Movement::Right,
        )
        .is_ok());
    }

    #[test]
    fn garbage_flag_byte_is_malformed() {
        let mut bytes = ambulance_transit().encode();
        bytes[8] = 7;
        assert!(matches!(
            CoordinationMessage::decode(&bytes),
            Err(ControlError::MalformedMessage(_))
        ));
    }

    #[test]
    fn unterminated_string_is_malformed() {
        let mut bytes = ambulance_transit().encode();
        for b in &mut bytes[25..33] {
            *b = b'X';
        }
        assert!(CoordinationMessage::decode(&bytes).is_err());
    }
}
