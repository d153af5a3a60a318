//! Lua scripts for atomic room operations.
//!
//! Redis runs each script without interleaving other commands, which turns
//! the admission check-and-append and the existence-checked append into
//! single indivisible steps.
//!
//! Participants are kept in the `participants` field of the meta hash as a
//! space separated list, preserving admission order.

/// Create room metadata unless the id is taken.
///
/// Arguments:
/// - KEYS[1]: Meta key (`meta:{id}`)
/// - ARGV[1]: Creation time (unix ms)
/// - ARGV[2]: Lifetime in milliseconds
///
/// Returns:
/// - 1: Created
/// - 0: Id already in use
pub const CREATE_ROOM: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end

redis.call('HSET', KEYS[1],
    'created_at', ARGV[1],
    'participants', '',
    'next_message_id', 0)
redis.call('PEXPIRE', KEYS[1], ARGV[2])
return 1
"#;

/// Admit a participant if a slot is free.
///
/// HSET on an existing hash keeps its TTL, so admission never extends the room.
///
/// Arguments:
/// - KEYS[1]: Meta key (`meta:{id}`)
/// - ARGV[1]: Token presented by the caller (empty string if none)
/// - ARGV[2]: Freshly minted candidate token
/// - ARGV[3]: Slot capacity
///
/// Returns:
/// - 2: Presented token is already a member
/// - 1: Candidate admitted
/// - 0: Room full
/// - -1: Room not found
pub const ADMIT_PARTICIPANT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return -1
end

local raw = redis.call('HGET', KEYS[1], 'participants') or ''
local count = 0
for token in string.gmatch(raw, '%S+') do
    if ARGV[1] ~= '' and token == ARGV[1] then
        return 2
    end
    count = count + 1
end

local capacity = tonumber(ARGV[3])
if capacity == nil or count >= capacity then
    return 0
end

if raw == '' then
    raw = ARGV[2]
else
    raw = raw .. ' ' .. ARGV[2]
end
redis.call('HSET', KEYS[1], 'participants', raw)
return 1
"#;

/// Append a message if the room still exists.
///
/// The message list is given the meta key's remaining lifetime on every
/// append so it expires together with the room.
///
/// Arguments:
/// - KEYS[1]: Meta key (`meta:{id}`)
/// - KEYS[2]: Messages key (`messages:{id}`)
/// - ARGV[1]: Message draft (JSON object without `id`)
///
/// Returns:
/// - >= 1: Assigned message id
/// - -1: Room not found
pub const APPEND_MESSAGE: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return -1
end

local id = redis.call('HINCRBY', KEYS[1], 'next_message_id', 1)
local entry = cjson.decode(ARGV[1])
entry['id'] = id
redis.call('RPUSH', KEYS[2], cjson.encode(entry))

local ttl = redis.call('PTTL', KEYS[1])
if ttl > 0 then
    redis.call('PEXPIRE', KEYS[2], ttl)
end
return id
"#;

/// Read the full message log if the room still exists.
///
/// Arguments:
/// - KEYS[1]: Meta key (`meta:{id}`)
/// - KEYS[2]: Messages key (`messages:{id}`)
///
/// Returns:
/// - Array of JSON message records (possibly empty)
/// - nil: Room not found
pub const LIST_MESSAGES: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return false
end
return redis.call('LRANGE', KEYS[2], 0, -1)
"#;
