//! Euclidean rhythms: `pulses` onsets spread as evenly as possible over `steps`

/// Bjorklund distribution, rotated left by `rotation` steps
///
/// ```
/// use strudel_mini::euclid::bjorklund;
///
/// let tresillo = bjorklund(3, 8, 0);
/// assert_eq!(tresillo, [true, false, false, true, false, false, true, false]);
/// ```
pub fn bjorklund(pulses: usize, steps: usize, rotation: usize) -> Vec<bool> {
    if steps == 0 {
        return Vec::new();
    }

    let mut result = if pulses >= steps {
        vec![true; steps]
    } else if pulses == 0 {
        vec![false; steps]
    } else {
        let mut heads: Vec<Vec<bool>> = vec![vec![true]; pulses];
        let mut tails: Vec<Vec<bool>> = vec![vec![false]; steps - pulses];

        while tails.len() > 1 {
            let paired = heads.len().min(tails.len());
            let remainder = if heads.len() > paired {
                heads.split_off(paired)
            } else {
                tails.split_off(paired)
            };
            for (head, tail) in heads.iter_mut().zip(tails.iter()) {
                head.extend_from_slice(tail);
            }
            tails = remainder;
        }

        heads.into_iter().chain(tails).flatten().collect()
    };

    result.rotate_left(rotation % steps);
    result
}
