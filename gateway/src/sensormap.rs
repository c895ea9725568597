//! Reads the sensor-to-room map file (`room_sensor.map`), lines of
//! `"sensor_id,room_id"`, as a finite stream of `(u16, u16)` pairs. A
//! malformed line is reported per entry rather than aborting the whole
//! load.

use std::io::{self, BufRead};

pub struct SensorMapIter<R> {
    lines: io::Lines<R>,
}

impl<R: BufRead> SensorMapIter<R> {
    pub fn new(reader: R) -> Self {
        SensorMapIter {
            lines: reader.lines(),
        }
    }
}

impl<R: BufRead> Iterator for SensorMapIter<R> {
    type Item = io::Result<(u16, u16)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e)),
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            return Some(parse_line(line));
        }
    }
}

fn parse_line(line: &str) -> io::Result<(u16, u16)> {
    let (sensor_id, room_id) = line
        .split_once(',')
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, format!("bad map line: {line:?}")))?;

    let sensor_id: u16 = sensor_id
        .trim()
        .parse()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, format!("bad sensor_id: {line:?}")))?;
    let room_id: u16 = room_id
        .trim()
        .parse()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, format!("bad room_id: {line:?}")))?;

    Ok((sensor_id, room_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_well_formed_lines() {
        let data = "21,7\n37,9\n";
        let pairs: Vec<_> = SensorMapIter::new(Cursor::new(data))
            .collect::<io::Result<Vec<_>>>()
            .unwrap();
        assert_eq!(pairs, vec![(21, 7), (37, 9)]);
    }

    #[test]
    fn skips_blank_lines_and_reports_malformed_ones() {
        let data = "21,7\n\nnot-a-line\n37,9\n";
        let results: Vec<_> = SensorMapIter::new(Cursor::new(data)).collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].as_ref().unwrap() == &(21, 7));
        assert!(results[1].is_err());
        assert!(results[2].as_ref().unwrap() == &(37, 9));
    }
}
